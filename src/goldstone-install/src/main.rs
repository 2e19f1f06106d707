//! Goldstone installer CLI: account bootstrap against the shared management
//! snapshot, and OpenStack host configuration over ssh.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use goldstone_core::config::AppConfig;
use goldstone_core::{GoldstoneError, GoldstoneResult};
use goldstone_installer::{configure_stack, LocalShell, RemoteShell, ServiceReport, SshShell, StackOptions};
use goldstone_management::bootstrap::{self, DockerInstallSettings, Prompt, DOCKER_MARKER};
use goldstone_management::models::InstallAddonRequest;
use goldstone_management::{addons, ManagementStore};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "goldstone-install")]
#[command(about = "Goldstone installation and OpenStack configuration tool")]
#[command(version)]
struct Cli {
    /// TOML config file, used for `store.data_file`
    #[arg(short, long, global = true, env = "GOLDSTONE_CONFIG")]
    config: Option<String>,

    /// Management snapshot file (overrides config)
    #[arg(long, global = true, env = "GOLDSTONE__STORE__DATA_FILE")]
    data_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Point OpenStack and rsyslog at a Goldstone server
    ConfigureStack {
        /// Comma-separated OpenStack hosts
        #[arg(short = 'H', long, value_delimiter = ',')]
        hosts: Vec<String>,

        /// Configure this machine instead of remote hosts
        #[arg(long, conflicts_with = "hosts")]
        local: bool,

        /// Goldstone server's hostname or IP reachable from the hosts
        #[arg(long)]
        goldstone_addr: Option<String>,

        /// Restart services after editing (yes/no)
        #[arg(long)]
        restart_services: Option<String>,

        /// Skip the confirmation prompt
        #[arg(long, default_value_t = false)]
        accept: bool,

        /// Directory holding one template subdirectory per service
        #[arg(long, env = "GOLDSTONE_TEMPLATE_ROOT", default_value = "crates/installer/templates")]
        template_root: PathBuf,

        /// ssh login user
        #[arg(long, default_value = "root")]
        ssh_user: String,

        /// ssh port
        #[arg(long)]
        ssh_port: Option<u16>,

        /// ssh identity file
        #[arg(long)]
        identity: Option<String>,
    },

    /// Create the superuser account
    AdminInit {
        #[arg(long, default_value = "admin")]
        username: String,

        #[arg(long)]
        password: Option<String>,

        #[arg(long, default_value = "root@localhost")]
        email: String,
    },

    /// Create a tenant and its admin account
    TenantInit {
        #[arg(long, default_value = "default")]
        tenant: String,

        #[arg(long, default_value = "None")]
        owner: String,

        #[arg(long, default_value = "gsadmin")]
        admin: String,

        #[arg(long)]
        admin_password: Option<String>,
    },

    /// Record OpenStack credentials for a tenant
    CloudInit {
        /// Goldstone tenant name
        #[arg(long, default_value = "default")]
        tenant: String,

        #[arg(long)]
        stack_tenant: Option<String>,

        #[arg(long)]
        stack_user: Option<String>,

        #[arg(long)]
        stack_password: Option<String>,

        #[arg(long)]
        stack_auth_url: Option<String>,
    },

    /// Admin, default tenant and cloud from the container environment
    DockerInstall,

    /// Register an add-on application
    InstallAddon {
        #[arg(long)]
        name: String,

        #[arg(long)]
        version: String,

        #[arg(long)]
        manufacturer: String,

        /// Must name an installed app, e.g. `leases/`
        #[arg(long)]
        url_root: String,

        #[arg(long)]
        notes: Option<String>,
    },
}

/// Interactive answers from stdin.
struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&self, question: &str, _secret: bool) -> GoldstoneResult<String> {
        let mut stdout = io::stdout();
        write!(stdout, "{question}: ")?;
        stdout.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        let answer = line.trim().to_string();
        if answer.is_empty() {
            return Err(GoldstoneError::Validation(vec![format!("no answer for '{question}'")]));
        }
        Ok(answer)
    }
}

fn yes_no(answer: &str) -> anyhow::Result<bool> {
    match answer.trim().to_lowercase().as_str() {
        "yes" | "y" => Ok(true),
        "no" | "n" => Ok(false),
        other => bail!("expected yes or no, got '{other}'"),
    }
}

fn data_file(cli: &Cli) -> anyhow::Result<PathBuf> {
    if let Some(path) = &cli.data_file {
        return Ok(PathBuf::from(path));
    }
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    config
        .store
        .data_file
        .map(PathBuf::from)
        .context("no management data file configured (--data-file or store.data_file)")
}

/// Load the snapshot, apply `change`, and write it back.
fn with_store<T>(
    path: &Path,
    change: impl FnOnce(&ManagementStore) -> GoldstoneResult<T>,
) -> anyhow::Result<T> {
    let store = ManagementStore::load(path)?;
    let result = change(&store)?;
    store.save(path)?;
    info!(path = %path.display(), "Management snapshot saved");
    Ok(result)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "goldstone_install=info,goldstone_installer=info,goldstone_management=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::ConfigureStack {
            hosts,
            local,
            goldstone_addr,
            restart_services,
            accept,
            template_root,
            ssh_user,
            ssh_port,
            identity,
        } => {
            let prompt = StdinPrompt;
            if !accept {
                let answer = prompt.ask(
                    "This utility will modify configuration files on the hosts supplied via -H, \
                     and optionally restart OpenStack and syslog services.\n\
                     Do you want to continue (yes/no)?",
                    false,
                )?;
                if !yes_no(&answer)? {
                    return Ok(());
                }
            }
            let restart = match restart_services {
                Some(answer) => yes_no(answer)?,
                None => yes_no(&prompt.ask(
                    "Restart OpenStack and syslog services after configuration changes (yes/no)?",
                    false,
                )?)?,
            };
            let goldstone_addr = match goldstone_addr {
                Some(addr) => addr.clone(),
                None => prompt.ask("Goldstone server's hostname or IP accessible to OpenStack hosts?", false)?,
            };

            let shells: Vec<Box<dyn RemoteShell>> = if *local {
                vec![Box::new(LocalShell)]
            } else {
                if hosts.is_empty() {
                    bail!("no hosts given (use -H host1,host2 or --local)");
                }
                hosts
                    .iter()
                    .map(|host| {
                        let mut shell = SshShell::new(host, Some(ssh_user.as_str()));
                        if let Some(port) = ssh_port {
                            shell = shell.with_port(*port);
                        }
                        if let Some(identity) = identity {
                            shell = shell.with_identity(identity.clone());
                        }
                        Box::new(shell) as Box<dyn RemoteShell>
                    })
                    .collect()
            };

            // One postfix for the whole run, so every host's backups line up.
            let options = StackOptions {
                goldstone_addr,
                restart,
                template_root: template_root.clone(),
                backup_postfix: Some(std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs().to_string())
                    .unwrap_or_default()),
            };

            let mut failed = 0;
            for shell in &shells {
                match configure_stack(shell.as_ref(), &options).await {
                    Ok(reports) => print_reports(shell.target(), &reports),
                    Err(e) => {
                        error!(host = shell.target(), error = %e, "Host configuration failed");
                        failed += 1;
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} hosts failed", shells.len());
            }
        }

        Commands::AdminInit {
            username,
            password,
            email,
        } => {
            let path = data_file(&cli)?;
            let outcome = with_store(&path, |store| {
                bootstrap::admin_init(store, username, password.as_deref(), email, &StdinPrompt)
            })?;
            println!(
                "{} admin account '{}'",
                if outcome.created() { "Created" } else { "Kept existing" },
                outcome.get().username
            );
        }

        Commands::TenantInit {
            tenant,
            owner,
            admin,
            admin_password,
        } => {
            let path = data_file(&cli)?;
            let (tenant, user) = with_store(&path, |store| {
                bootstrap::tenant_init(store, tenant, owner, admin, admin_password.as_deref(), &StdinPrompt)
            })?;
            println!("Tenant:       {} ({})", tenant.get().name, tenant.get().uuid);
            println!("Tenant admin: {}", user.get().username);
        }

        Commands::CloudInit {
            tenant,
            stack_tenant,
            stack_user,
            stack_password,
            stack_auth_url,
        } => {
            let path = data_file(&cli)?;
            let prompt = StdinPrompt;
            let stack_tenant = match stack_tenant {
                Some(t) => t.clone(),
                None => prompt.ask("OpenStack tenant name", false)?,
            };
            let stack_user = match stack_user {
                Some(u) => u.clone(),
                None => prompt.ask("OpenStack user name", false)?,
            };
            let cloud = with_store(&path, |store| {
                let gs_tenant = store
                    .find_tenant_by_name(tenant)
                    .ok_or_else(|| GoldstoneError::NotFound(format!("tenant '{tenant}'")))?;
                bootstrap::cloud_init(
                    store,
                    &gs_tenant,
                    &stack_tenant,
                    &stack_user,
                    stack_password.as_deref(),
                    stack_auth_url.as_deref(),
                    &prompt,
                )
            })?;
            println!("Cloud: {} @ {}", cloud.get().username, cloud.get().auth_url);
        }

        Commands::DockerInstall => {
            let path = data_file(&cli)?;
            let settings = DockerInstallSettings::from_env();
            let report = with_store(&path, |store| {
                bootstrap::docker_install(store, &settings, Path::new(DOCKER_MARKER))
            })?;
            println!("Admin:        {}", report.admin.get().username);
            println!("Tenant:       {}", report.tenant.get().name);
            println!("Tenant admin: {}", report.tenant_admin.get().username);
            println!("Cloud:        {}", report.cloud.get().auth_url);
        }

        Commands::InstallAddon {
            name,
            version,
            manufacturer,
            url_root,
            notes,
        } => {
            if addons::app_name(url_root).is_none() {
                bail!("'{url_root}' is not a valid add-on url_root");
            }
            let path = data_file(&cli)?;
            let addon = with_store(&path, |store| {
                Ok(store.install_addon(InstallAddonRequest {
                    name: name.clone(),
                    version: version.clone(),
                    manufacturer: manufacturer.clone(),
                    url_root: url_root.clone(),
                    notes: notes.clone(),
                }))
            })?;
            println!("{}", serde_json::to_string_pretty(&addon)?);
        }
    }

    Ok(())
}

fn print_reports(host: &str, reports: &[ServiceReport]) {
    println!("{host}");
    for report in reports {
        println!(
            "  {:<12} edits={:<3} uploads={:<2} backups={:<2} restarted={}",
            report.service,
            report.edits.iter().filter(|e| e.outcome.changed()).count(),
            report.uploads.len(),
            report.backups.len(),
            report.restarted,
        );
        for skipped in &report.skipped {
            println!("    skipped: {skipped}");
        }
    }
}
