//! Anima CLI
//!
//! Terminal console for a remotely hosted agent: set it up, probe its
//! gateway and chat with it.

use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password};
use secrecy::SecretString;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use anima::chat::{ChatMessage, Role, DEFAULT_EMOTION};
use anima::config::{
    apply_env_overrides, load_config, load_config_from_path, save_config, validate_config, Config,
};
use anima::directory::{open_directory, AgentDirectory, IdentityProvider, StaticIdentity};
use anima::gateway::probe;
use anima::setup::{DEFAULT_AGENT_NAME, DEFAULT_GATEWAY_URL};
use anima::vault::FileKeyStore;
use anima::{
    logging, open_console, AgentSetup, ConnectionState, ConsoleLaunch, Error, Result,
    SessionSnapshot, SetupForm, SetupStage, TokenVault, VERSION,
};

#[derive(Parser)]
#[command(
    name = "anima",
    author = "Anima Contributors",
    version = VERSION,
    about = "Anima - console for your remote agent",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true, env = "ANIMA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure an agent: probe its gateway, encrypt the token, save it
    Setup {
        /// Agent name
        #[arg(long)]
        name: Option<String>,
        /// Gateway URL (ws:// or wss://)
        #[arg(long)]
        url: Option<String>,
        /// Gateway token (prompted for if absent)
        #[arg(long, env = "ANIMA_GATEWAY_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Check that a gateway accepts a token, without saving anything
    Probe {
        /// Gateway URL (ws:// or wss://)
        #[arg(long, default_value = DEFAULT_GATEWAY_URL)]
        url: String,
        /// Gateway token (prompted for if absent)
        #[arg(long, env = "ANIMA_GATEWAY_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Open the chat console for your agent
    Chat,

    /// Show configuration, identity and agent status
    Status,

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load(cli.config.as_ref())?;

    logging::init(&config.log)?;

    match cli.command {
        Commands::Setup { name, url, token } => run_setup(&config, name, url, token).await,
        Commands::Probe { url, token } => run_probe(&config, &url, token).await,
        Commands::Chat => run_chat(&config).await,
        Commands::Status => check_status(&config).await,
        Commands::InitConfig { force } => init_config(cli.config.as_ref(), force),
    }
}

fn load(path: Option<&PathBuf>) -> Result<Config> {
    let Some(path) = path else {
        return load_config();
    };
    let mut config = if path.exists() {
        load_config_from_path(path)?
    } else {
        Config::default()
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

// ============================================================================
// Prompts
// ============================================================================

/// Get the dialoguer theme
fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}

/// Prompt with a default value shown
fn prompt_with_default(message: &str, default: &str) -> Result<String> {
    let input: String = Input::with_theme(&theme())
        .with_prompt(message)
        .default(default.to_string())
        .interact_text()
        .map_err(|e| Error::InvalidInput(format!("Input error: {}", e)))?;
    Ok(input)
}

/// Prompt for sensitive input (hidden)
fn prompt_secret(message: &str) -> Result<SecretString> {
    let secret = Password::with_theme(&theme())
        .with_prompt(message)
        .interact()
        .map_err(|e| Error::InvalidInput(format!("Password error: {}", e)))?;
    Ok(SecretString::from(secret))
}

fn token_or_prompt(token: Option<String>) -> Result<SecretString> {
    match token {
        Some(token) => Ok(SecretString::from(token)),
        None => prompt_secret("Gateway token"),
    }
}

/// Print a banner
fn print_banner(title: &str) {
    println!();
    println!("{}", style("╔══════════════════════════════════════════════════╗").cyan());
    println!("{}", style(format!("║  {:<48}║", title)).cyan());
    println!("{}", style("╚══════════════════════════════════════════════════╝").cyan());
    println!();
}

fn identity(config: &Config) -> StaticIdentity {
    StaticIdentity::from_config(&config.identity)
}

fn vault(config: &Config) -> Arc<TokenVault> {
    Arc::new(TokenVault::from_config(&config.vault))
}

// ============================================================================
// Commands
// ============================================================================

async fn run_setup(
    config: &Config,
    name: Option<String>,
    url: Option<String>,
    token: Option<String>,
) -> Result<()> {
    print_banner("Configure Your Agent");
    println!(
        "   {}",
        style("Your token is encrypted on this device before it is stored.").dim()
    );
    println!();

    let name = match name {
        Some(name) => name,
        None => prompt_with_default("Agent name", DEFAULT_AGENT_NAME)?,
    };
    let url = match url {
        Some(url) => url,
        None => prompt_with_default("Gateway URL", DEFAULT_GATEWAY_URL)?,
    };
    let token = token_or_prompt(token)?;

    let directory = open_directory(&config.directory).await?;
    let setup = AgentSetup::new(
        vault(config),
        directory,
        Arc::new(identity(config)),
        config.probe.clone(),
    );

    let form = SetupForm::new(token).with_name(name).with_gateway_url(url);
    let outcome = setup
        .run(form, |stage| {
            let label = match stage {
                SetupStage::Testing => "Testing connection",
                SetupStage::Encrypting => "Encrypting token",
                SetupStage::Saving => "Saving agent",
                SetupStage::Success => return,
            };
            println!("   {} {}...", style("○").dim(), label);
        })
        .await;

    match outcome {
        Ok(id) => {
            println!();
            println!("   {} Agent saved ({})", style("✓").green(), style(id).dim());
            println!("   Run {} to start talking.", style("anima chat").cyan());
            println!();
            Ok(())
        }
        Err(failure) => {
            println!();
            println!("   {} {}", style("✗").red(), failure.message);
            println!();
            Err(Error::InvalidInput(format!("Setup failed while {}", failure.stage)))
        }
    }
}

async fn run_probe(config: &Config, url: &str, token: Option<String>) -> Result<()> {
    let token = token_or_prompt(token)?;

    print!("   {} Probing {}... ", style("○").dim(), url);
    io::stdout().flush()?;

    match probe(url, &token, &config.probe).await {
        Ok(()) => {
            println!("{}", style("✓ Connected").green());
            Ok(())
        }
        Err(e) => {
            println!("{}", style("✗").red());
            if e.requires_new_credential() {
                println!("   {}", style("Check the gateway token and try again.").dim());
            }
            Err(e)
        }
    }
}

async fn check_status(config: &Config) -> Result<()> {
    print_banner("Anima Status");

    let validation = validate_config(config);
    if validation.valid {
        println!("   {} Configuration valid", style("✓").green());
    } else {
        println!("   {} Configuration has errors", style("✗").red());
    }
    for issue in &validation.errors {
        println!("      └─ {} {}", style("error").red(), issue);
    }
    for issue in &validation.warnings {
        println!("      └─ {} {}", style("warning").yellow(), issue);
    }

    let key_path = config.vault.key_path();
    let key_store = FileKeyStore::new(&key_path);
    if key_store.path().exists() {
        println!("   {} Vault key: {}", style("✓").green(), key_path.display());
    } else {
        println!(
            "   {} Vault key: not created yet ({})",
            style("○").dim(),
            key_path.display()
        );
    }

    let Some(user) = identity(config).current_user().await? else {
        println!("   {} Not signed in (set ANIMA_USER_ID)", style("✗").red());
        println!();
        return Ok(());
    };
    println!("   {} Signed in as {}", style("✓").green(), style(&user).cyan());

    let directory = match open_directory(&config.directory).await {
        Ok(directory) => directory,
        Err(e) => {
            println!("   {} Agent directory: {}", style("✗").red(), e);
            println!();
            return Ok(());
        }
    };

    match directory.get(&user).await {
        Ok(Some(record)) => {
            println!(
                "   {} Agent: {} ({})",
                style("✓").green(),
                style(&record.name).cyan(),
                record.gateway_url
            );
            println!("      └─ Directory: {}", directory.id());
            println!("      └─ Created: {}", record.created_at.format("%Y-%m-%d %H:%M UTC"));
        }
        Ok(None) => println!(
            "   {} No agent configured. Run {}",
            style("○").dim(),
            style("anima setup").cyan()
        ),
        Err(e) => println!("   {} Agent directory: {}", style("✗").red(), e),
    }

    println!();
    Ok(())
}

fn init_config(path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = path.cloned().unwrap_or_else(anima::config::config_path);

    if path.exists() && !force {
        let overwrite = Confirm::with_theme(&theme())
            .with_prompt(format!("{} exists. Overwrite?", path.display()))
            .default(false)
            .interact()
            .map_err(|e| Error::InvalidInput(format!("Confirm error: {}", e)))?;
        if !overwrite {
            return Ok(());
        }
    }

    save_config(&Config::default(), &path)?;
    println!("   {} Wrote {}", style("✓").green(), path.display());
    Ok(())
}

// ============================================================================
// Chat
// ============================================================================

async fn run_chat(config: &Config) -> Result<()> {
    let directory: Arc<dyn AgentDirectory> = open_directory(&config.directory).await?;
    let launch = open_console(
        &identity(config),
        directory.as_ref(),
        vault(config),
        &config.gateway,
    )
    .await?;

    let (record, session) = match launch {
        ConsoleLaunch::NeedsSetup => {
            println!(
                "   {} No agent configured yet. Run {} first.",
                style("○").dim(),
                style("anima setup").cyan()
            );
            return Ok(());
        }
        ConsoleLaunch::Ready { record, session } => (record, session),
    };

    print_banner(&record.name);
    println!("   {}", style("Commands:").dim());
    println!("   {}   - Exit chat", style("/quit").yellow());
    println!("   {} - Show connection state", style("/status").yellow());
    println!();

    let mut snapshots = session.subscribe();
    let mut lines = spawn_input_reader();
    let mut view = ChatView::default();
    view.render(&snapshots.borrow_and_update());

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                view.render(&snapshot);
                if snapshot.state.is_terminal() {
                    break;
                }
            }
            line = lines.recv() => {
                let Some(line) = line else { break };
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                match input {
                    "/quit" | "/exit" | "/q" => break,
                    "/status" => {
                        println!("   {} {}", style("state:").dim(), session.state());
                        continue;
                    }
                    _ => {}
                }
                if let Err(e) = session.send_message(input).await {
                    if e.is_client_error() {
                        println!("   {} {}", style("⚠").yellow(), e);
                    } else {
                        println!("   {} {}", style("✗").red(), e);
                        break;
                    }
                }
            }
        }
    }

    session.shutdown().await;
    println!("\n{} Goodbye!\n", style("👋").bold());
    Ok(())
}

/// Read prompt lines on a plain thread, which does not hold up exit
fn spawn_input_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    std::thread::spawn(move || loop {
        let line: String = match Input::with_theme(&theme())
            .with_prompt(style("You").green().bold().to_string())
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => line,
            Err(_) => break,
        };
        let quit = matches!(line.trim(), "/quit" | "/exit" | "/q");
        if tx.blocking_send(line).is_err() || quit {
            break;
        }
    });
    rx
}

/// Prints what changed between snapshots
#[derive(Default)]
struct ChatView {
    shown: HashMap<String, String>,
    state: Option<ConnectionState>,
    emotion: Option<String>,
}

impl ChatView {
    fn render(&mut self, snapshot: &SessionSnapshot) {
        if self.state != Some(snapshot.state) {
            self.state = Some(snapshot.state);
            let label = match snapshot.state {
                ConnectionState::Connected => style(snapshot.state.as_str()).green(),
                ConnectionState::Error => style(snapshot.state.as_str()).red(),
                _ => style(snapshot.state.as_str()).dim(),
            };
            println!("   {} {}", style("●").dim(), label);
        }

        for message in &snapshot.messages {
            self.render_message(message);
        }

        if self.emotion.as_deref() != Some(snapshot.emotion.as_str()) {
            if snapshot.emotion != DEFAULT_EMOTION || self.emotion.is_some() {
                println!("   {}", style(format!("({})", snapshot.emotion)).magenta().dim());
            }
            self.emotion = Some(snapshot.emotion.clone());
        }
    }

    fn render_message(&mut self, message: &ChatMessage) {
        let text = message.display_text();
        if self.shown.get(&message.id) == Some(&text) {
            return;
        }
        let speaker = match message.role {
            Role::User => style("You").green().bold(),
            Role::Model => style("Agent").cyan().bold(),
            Role::System => style("System").yellow().bold(),
        };
        println!("{}: {}", speaker, text);
        self.shown.insert(message.id.clone(), text);
    }
}
