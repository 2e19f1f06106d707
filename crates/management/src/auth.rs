//! Password hashing, bearer token issue, and the middleware guarding the
//! account routes.

use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::handlers::ManagementState;
use crate::models::{ErrorResponse, LoginRequest, LoginResponse, User};
use crate::store::ManagementStore;

const HASH_SCHEME: &str = "sha256";
const TOKEN_PREFIX: &str = "gs_";

pub const SCOPE_READ: &str = "read";
pub const SCOPE_WRITE: &str = "write";
pub const SCOPE_GROUPS: &str = "groups";

fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
    hex::encode(bytes)
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// `sha256$<salt>$<hex digest>`
pub fn hash_password(password: &str) -> String {
    let salt = random_hex(8);
    format!("{HASH_SCHEME}${salt}${}", digest(&salt, password))
}

pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.splitn(3, '$');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(HASH_SCHEME), Some(salt), Some(expected)) => digest(salt, password) == expected,
        _ => false,
    }
}

/// Look the user up and check the password. Inactive users cannot log in.
pub fn authenticate(store: &ManagementStore, req: &LoginRequest) -> Option<User> {
    let user = store.find_user_by_username(&req.username)?;
    if user.is_active && verify_password(&req.password, &user.password_hash) {
        Some(user)
    } else {
        None
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub user_id: Uuid,
    pub username: String,
    pub is_superuser: bool,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Live bearer tokens.
pub struct TokenRegistry {
    tokens: DashMap<String, IssuedToken>,
    ttl: Duration,
}

impl TokenRegistry {
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            tokens: DashMap::new(),
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user: &User) -> LoginResponse {
        let mut scopes = vec![SCOPE_READ.to_string(), SCOPE_WRITE.to_string()];
        if user.is_superuser {
            scopes.push(SCOPE_GROUPS.to_string());
        }

        let now = Utc::now();
        // Tokens nobody presents again are only dropped here.
        self.tokens.retain(|_, t| t.expires_at > now);

        let token = format!("{TOKEN_PREFIX}{}", random_hex(32));
        let expires_at = now + self.ttl;
        self.tokens.insert(
            token.clone(),
            IssuedToken {
                user_id: user.uuid,
                username: user.username.clone(),
                is_superuser: user.is_superuser,
                scopes: scopes.clone(),
                expires_at,
            },
        );
        debug!(username = %user.username, "Token issued");

        LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            scope: scopes.join(" "),
            expires_at,
        }
    }

    /// The token's grant, if it exists and has not expired. Expired tokens
    /// are dropped.
    pub fn validate(&self, token: &str) -> Option<IssuedToken> {
        let issued = self.tokens.get(token)?.value().clone();
        if issued.expires_at <= Utc::now() {
            self.tokens.remove(token);
            return None;
        }
        Some(issued)
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }
}

fn reject(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn guarded(path: &str) -> bool {
    ["/user", "/groups", "/tenants"]
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
}

/// Bearer check for `/user`, `/groups` and `/tenants`. Everything else passes
/// through untouched.
pub async fn require_token(
    State(state): State<ManagementState>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if !guarded(&path) {
        return next.run(req).await;
    }

    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = bearer else {
        return reject(
            StatusCode::UNAUTHORIZED,
            "missing_auth",
            "Authorization header with Bearer token required",
        );
    };
    let Some(grant) = state.tokens.validate(token) else {
        warn!(path = %path, "Rejected invalid or expired token");
        return reject(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            "Invalid or expired bearer token",
        );
    };

    let scope = if path.starts_with("/groups") {
        SCOPE_GROUPS
    } else if req.method() == Method::GET {
        SCOPE_READ
    } else {
        SCOPE_WRITE
    };
    if !grant.has_scope(scope) {
        return reject(
            StatusCode::FORBIDDEN,
            "insufficient_scope",
            &format!("Token lacks the '{scope}' scope"),
        );
    }
    if path.starts_with("/tenants") && !grant.is_superuser {
        return reject(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Tenant administration requires a superuser",
        );
    }

    req.extensions_mut().insert(grant);
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateUserRequest;

    fn user(store: &ManagementStore, name: &str, superuser: bool) -> User {
        store
            .create_user(CreateUserRequest {
                username: name.into(),
                password: "goldstone".into(),
                email: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                is_superuser: superuser,
            })
            .unwrap()
    }

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("solinea");
        assert!(hash.starts_with("sha256$"));
        assert!(verify_password("solinea", &hash));
        assert!(!verify_password("Solinea", &hash));
        assert!(!verify_password("solinea", "plaintext"));
        assert_ne!(hash, hash_password("solinea"));
    }

    #[test]
    fn test_authenticate() {
        let store = ManagementStore::new();
        user(&store, "gsadmin", false);
        let ok = LoginRequest {
            username: "gsadmin".into(),
            password: "goldstone".into(),
        };
        assert!(authenticate(&store, &ok).is_some());
        let bad = LoginRequest {
            password: "nope".into(),
            ..ok
        };
        assert!(authenticate(&store, &bad).is_none());
    }

    #[test]
    fn test_scopes_by_role() {
        let store = ManagementStore::new();
        let registry = TokenRegistry::new(24);

        let admin = registry.issue(&user(&store, "admin", true));
        assert_eq!(admin.scope, "read write groups");
        let plain = registry.issue(&user(&store, "bob", false));
        assert_eq!(plain.scope, "read write");

        let grant = registry.validate(&plain.token).unwrap();
        assert_eq!(grant.username, "bob");
        assert!(!grant.has_scope(SCOPE_GROUPS));
        assert!(registry.revoke(&plain.token));
        assert!(registry.validate(&plain.token).is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let store = ManagementStore::new();
        let registry = TokenRegistry::new(0);
        let login = registry.issue(&user(&store, "bob", false));
        assert!(registry.validate(&login.token).is_none());
    }

    #[test]
    fn test_issue_sweeps_expired_tokens() {
        let store = ManagementStore::new();
        let registry = TokenRegistry::new(-1);
        let bob = user(&store, "bob", false);
        for _ in 0..50 {
            registry.issue(&bob);
        }
        assert_eq!(registry.tokens.len(), 1);

        let live = TokenRegistry::new(24);
        live.issue(&bob);
        live.issue(&bob);
        assert_eq!(live.tokens.len(), 2);
    }

    #[test]
    fn test_guarded_paths() {
        assert!(guarded("/user"));
        assert!(guarded("/user/abc"));
        assert!(guarded("/tenants/x/cloud"));
        assert!(!guarded("/users-report"));
        assert!(!guarded("/accounts/login"));
        assert!(!guarded("/addons/verify"));
    }
}
