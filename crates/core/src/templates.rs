//! Placeholder substitution for config templates pushed to remote hosts.
//!
//! Both `{{ name }}` and `%(name)s` forms are understood, since the stock
//! OpenStack templates use the latter. Unknown names are left as written.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}|%\(([A-Za-z_][A-Za-z0-9_]*)\)s")
            .expect("placeholder pattern is valid")
    })
}

pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn render(body: &str, context: &HashMap<String, String>) -> String {
        placeholder()
            .replace_all(body, |caps: &Captures| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                match context.get(name) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_both_styles() {
        let mut ctx = HashMap::new();
        ctx.insert("goldstone_addr".to_string(), "10.0.0.5".to_string());

        let out = TemplateRenderer::render(
            "*.* @@{{ goldstone_addr }}:5514\npublisher = udp://%(goldstone_addr)s:4952\n",
            &ctx,
        );
        assert_eq!(out, "*.* @@10.0.0.5:5514\npublisher = udp://10.0.0.5:4952\n");
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        let out = TemplateRenderer::render("x = {{ missing }} %(other)s", &HashMap::new());
        assert_eq!(out, "x = {{ missing }} %(other)s");
    }
}
