use std::{collections::BTreeMap, io::Write, path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::Parser;
use sudo_prompt::{Config, ElevationRequest, Elevator, Error};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Run a command as administrator behind the native password prompt.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Shown in the prompt. Letters, digits and spaces only.
    #[arg(short, long)]
    name: Option<String>,

    /// .icns file for the macOS prompt.
    #[arg(long)]
    icon: Option<PathBuf>,

    /// Environment variable for the command, as KEY=VALUE. Repeatable.
    #[arg(short, long = "env", value_parser = parse_env)]
    envs: Vec<(String, String)>,

    /// JSON file overriding the default configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Zip of the macOS prompt applet. Overrides the config file.
    #[arg(long)]
    applet: Option<PathBuf>,

    /// The command. Several words are shell-quoted and joined; a single word
    /// is passed through untouched.
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

fn parse_env(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => Config::default(),
    };
    if let Some(applet) = &args.applet {
        config.applet = Some(applet.clone());
    }
    Ok(config)
}

fn build_request(args: &Args) -> Result<ElevationRequest, Error> {
    let command = match args.command.as_slice() {
        [single] => single.clone(),
        words => shell_words::join(words),
    };
    let mut builder = ElevationRequest::builder(command);
    if let Some(name) = &args.name {
        builder = builder.name(name);
    }
    if let Some(icon) = &args.icon {
        builder = builder.icon(icon);
    }
    if !args.envs.is_empty() {
        builder = builder.envs(args.envs.iter().cloned().collect::<BTreeMap<_, _>>());
    }
    builder.build()
}

fn exit_code_for(e: &Error) -> u8 {
    match e {
        Error::CommandFailed { code, .. } => match u8::try_from(*code) {
            Ok(code) => code.max(1),
            Err(_) => {
                debug!(code = *code, "Exit code does not fit in a process exit status, using 1");
                1
            }
        },
        e if e.is_permission_denied() => 126,
        _ => 1,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    debug!(?args, "Parsed arguments");

    let config = load_config(&args)?;
    let request = build_request(&args)?;
    let elevator = Elevator::system(config)?;

    let (stdout, stderr, code) = match elevator.exec(&request).await {
        Ok(out) => (out.stdout, out.stderr, 0),
        Err(e) => {
            let code = exit_code_for(&e);
            match e {
                Error::CommandFailed { stdout, stderr, .. } => (stdout, stderr, code),
                e => {
                    eprintln!("{e}");
                    (String::new(), String::new(), code)
                }
            }
        }
    };
    std::io::stdout().write_all(stdout.as_bytes())?;
    std::io::stderr().write_all(stderr.as_bytes())?;
    Ok(ExitCode::from(code))
}
