use std::path::PathBuf;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Rulestack manages versioned rule packages for AI assistants.
///
/// Declare packages in `rulestack.json`, install them into `.rulestack/`,
/// and publish your own to a shared registry.
#[derive(clap::Parser, Debug)]
#[command(version, author)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
    /// Increase log verbosity: `-v` for debug logs, `-vv` for trace logs.
    ///
    /// The `RULESTACK_LOG` environment variable overrides the flags with
    /// a full filter directive, e.g. `RULESTACK_LOG=rulestack_core=trace`.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl CliArgs {
    /// Log level the `-v` flags ask for. Extra repetitions saturate at
    /// trace.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Scaffold a rulestack project in the current directory.
    Init(Init),
    /// Install one package and add it to the project manifest.
    ///
    /// Specify the package with the syntax `<name>@<version>`.
    /// E.g. `rulestack add security-rules@1.2.0`.
    Add(Add),
    /// Reconcile `.rulestack/` with the project manifest.
    Install(Install),
    /// Stage a rule file as a publishable package archive.
    Pack(Pack),
    /// Upload all staged archives to the active registry.
    Publish,
    /// Search packages in the active registry.
    Search(Search),
    /// Manage the configured registries.
    #[command(subcommand)]
    Registry(Registry),
    /// Manage accounts and sessions on the active HTTP registry.
    #[command(subcommand)]
    Auth(Auth),
    /// List the archives staged for publishing.
    Status,
}

#[derive(clap::Args, Debug)]
pub struct Init {
    /// Overwrite an existing project manifest.
    #[arg(long)]
    pub force: bool,
}

#[derive(clap::Args, Debug)]
pub struct Add {
    /// Package to install, as `<name>@<version>`.
    pub package: String,
}

#[derive(clap::Args, Debug)]
pub struct Install {
    /// Directory of the project to install into.
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct Pack {
    /// The `.mdc` rule file to pack.
    pub file: PathBuf,
    /// Package name. Defaults to the file name without its extension.
    #[arg(long)]
    pub package: Option<String>,
    /// Exact version for the new package.
    ///
    /// Must be strictly greater than the installed version when the package
    /// already exists. Without this flag, an existing package gets a patch
    /// bump and a new package starts at 1.0.0.
    #[arg(long)]
    pub version: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct Search {
    /// Search term matched against package names and descriptions.
    pub query: String,
    /// Only show packages carrying this tag.
    #[arg(long)]
    pub tag: Option<String>,
    /// Only show packages targeting this assistant.
    #[arg(long)]
    pub target: Option<String>,
    /// Maximum number of results.
    #[arg(long)]
    pub limit: Option<u32>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum RegistryType {
    RemoteHttp,
    Git,
}

#[derive(clap::Subcommand, Debug)]
pub enum Registry {
    /// Add a registry to the user configuration.
    Add(RegistryAdd),
    /// List the configured registries.
    List,
    /// Select the active registry.
    Use(RegistryUse),
    /// Remove a registry from the user configuration.
    Remove(RegistryRemove),
    /// Create the default structure of a new Git registry and push it.
    Init(RegistryInit),
}

#[derive(clap::Args, Debug)]
pub struct RegistryAdd {
    /// Name the registry is referred to by.
    pub name: String,
    /// Base URL (HTTP) or repository URL (Git).
    pub url: String,
    #[arg(long, value_enum, default_value = "remote-http")]
    pub r#type: RegistryType,
}

#[derive(clap::Args, Debug)]
pub struct RegistryUse {
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct RegistryRemove {
    pub name: String,
}

#[derive(clap::Args, Debug)]
pub struct RegistryInit {
    /// Git token used to push the initial commit.
    #[arg(long)]
    pub token: String,
}

#[derive(clap::Subcommand, Debug)]
pub enum Auth {
    /// Create an account on the active HTTP registry.
    Register(AuthRegister),
    /// Log in and store the session token in the user configuration.
    Login(AuthLogin),
    /// Invalidate the current session and forget the stored token.
    Logout,
    /// Show the account the stored token belongs to.
    Whoami,
}

#[derive(clap::Args, Debug)]
pub struct AuthRegister {
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    /// Password. Prompted for when omitted.
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct AuthLogin {
    #[arg(long)]
    pub username: Option<String>,
    /// Password. Prompted for when omitted.
    #[arg(long)]
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn verbose_flags_saturate_at_trace() {
        use clap::Parser;
        let args = CliArgs::parse_from(["rulestack", "status"]);
        assert_eq!(args.log_level(), LevelFilter::INFO);

        let args = CliArgs::parse_from(["rulestack", "-v", "status"]);
        assert_eq!(args.log_level(), LevelFilter::DEBUG);

        let args = CliArgs::parse_from(["rulestack", "-vvvv", "status"]);
        assert_eq!(args.log_level(), LevelFilter::TRACE);
    }

    #[test]
    fn registry_add_defaults_to_http() {
        use clap::Parser;
        let args =
            CliArgs::parse_from(["rulestack", "registry", "add", "main", "https://reg.example"]);
        let Command::Registry(Registry::Add(add)) = args.command else {
            panic!("expected registry add");
        };
        assert_eq!(add.r#type, RegistryType::RemoteHttp);
    }
}
