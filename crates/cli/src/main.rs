//! `skillbox` command line: drives the sandboxed tool surface directly, so
//! every agent-facing operation can be exercised and scripted from a shell.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use skillbox_config::AppConfig;
use skillbox_sandbox::Sandbox;
use skillbox_skills::SkillManager;
use skillbox_tools::{
    Tool, ToolContext, ToolRegistry, register_builtin_tools, specs_to_openai_tools,
};

const CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Parser)]
#[command(
    name = "skillbox",
    version,
    about = "Sandboxed skills workspace for AI agents"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List a directory, or all skills with path 'skills'.
    Ls {
        /// Virtual path (default: the skills directory).
        #[arg(default_value = "")]
        path: String,
    },
    /// Print a file.
    Read { path: String },
    /// Write a file, creating parent directories.
    Write { path: String, content: String },
    /// Search file contents for a regular expression.
    Search {
        pattern: String,
        /// Virtual path to a file or directory (default: the skills directory).
        #[arg(default_value = "")]
        path: String,
    },
    /// Run a shell command in the sandbox.
    Bash {
        command: String,
        #[arg(long)]
        timeout: Option<u64>,
        /// Working directory as a virtual path.
        #[arg(long)]
        cwd: Option<String>,
    },
    /// Run a command inside a skill directory.
    Run {
        name: String,
        command: String,
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Manage skill packages.
    Skill {
        #[command(subcommand)]
        command: SkillCommands,
    },
    /// List tracked background tasks.
    Jobs,
    /// Terminate a background task by pid.
    Kill { pid: u32 },
    /// Print the tool surface as an OpenAI-compatible `tools` JSON array.
    Tools,
}

#[derive(Debug, Subcommand)]
enum SkillCommands {
    /// List all discovered skills.
    List,
    /// Create a new skill with a SKILL.md descriptor.
    Create {
        name: String,
        #[arg(long)]
        description: String,
        /// Markdown instructions; read from the given file when it starts
        /// with '@', e.g. '@instructions.md'.
        #[arg(long)]
        instructions: String,
    },
    /// Validate a SKILL.md file or a skill directory.
    Validate { path: String },
    /// Add a file to an existing skill.
    AddFile {
        name: String,
        file_path: String,
        content: String,
    },
    /// Show metadata for one skill.
    Info { name: String },
}

fn build_registry(config: &AppConfig) -> Result<(Arc<ToolContext>, ToolRegistry)> {
    let sandbox = Arc::new(Sandbox::new(config.sandbox.clone())?);

    let mut skills_dirs: Vec<PathBuf> = config.skills.skills_dirs.iter().map(PathBuf::from).collect();
    if skills_dirs.is_empty() {
        skills_dirs.push(PathBuf::from("skills"));
    }
    std::fs::create_dir_all(&skills_dirs[0])
        .with_context(|| format!("cannot create skills directory {}", skills_dirs[0].display()))?;

    let create_dir = config.skills.effective_create_dir().map(PathBuf::from);
    let skills = Arc::new(SkillManager::new(skills_dirs.clone(), create_dir));

    let ctx = ToolContext::new(sandbox, skills, skills_dirs[0].clone());
    let registry = register_builtin_tools(&ctx);
    Ok((ctx, registry))
}

/// Run one built-in tool and print its output; a failed tool becomes a
/// non-zero exit status.
async fn invoke(registry: &ToolRegistry, name: &str, args: &[(&str, String)]) -> Result<()> {
    let tool = registry
        .get(name)
        .with_context(|| format!("unknown tool {name}"))?;
    let args: HashMap<String, String> = args
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();

    let result = tool.run(&args).await?;
    println!("{}", result.output);
    if !result.success {
        bail!("{name} failed");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.telemetry.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (ctx, registry) = build_registry(&config)?;

    match cli.command {
        Commands::Ls { path } => invoke(&registry, "skills_ls", &[("path", path)]).await?,
        Commands::Read { path } => invoke(&registry, "skills_read", &[("path", path)]).await?,
        Commands::Write { path, content } => {
            invoke(
                &registry,
                "skills_write",
                &[("path", path), ("content", content)],
            )
            .await?
        }
        Commands::Search { pattern, path } => {
            invoke(
                &registry,
                "skills_search",
                &[("pattern", pattern), ("path", path)],
            )
            .await?
        }
        Commands::Bash {
            command,
            timeout,
            cwd,
        } => {
            let timeout = timeout.unwrap_or(config.exec.default_timeout_secs);
            invoke(
                &registry,
                "skills_bash",
                &[
                    ("command", command),
                    ("timeout", timeout.to_string()),
                    ("cwd", cwd.unwrap_or_default()),
                ],
            )
            .await?
        }
        Commands::Run {
            name,
            command,
            timeout,
        } => {
            let timeout = timeout.unwrap_or(config.exec.skill_timeout_secs);
            invoke(
                &registry,
                "skills_run",
                &[
                    ("name", name),
                    ("command", command),
                    ("timeout", timeout.to_string()),
                ],
            )
            .await?
        }
        Commands::Skill { command } => run_skill_command(&ctx, &registry, command).await?,
        Commands::Jobs => invoke(&registry, "skills_jobs", &[]).await?,
        Commands::Kill { pid } => {
            invoke(&registry, "skills_kill", &[("pid", pid.to_string())]).await?
        }
        Commands::Tools => {
            let tools = specs_to_openai_tools(&registry.list_specs());
            println!("{}", serde_json::to_string_pretty(&tools)?);
        }
    }

    Ok(())
}

async fn run_skill_command(
    ctx: &Arc<ToolContext>,
    registry: &ToolRegistry,
    command: SkillCommands,
) -> Result<()> {
    match command {
        SkillCommands::List => invoke(registry, "skills_ls", &[("path", "skills".into())]).await,
        SkillCommands::Create {
            name,
            description,
            instructions,
        } => {
            let instructions = match instructions.strip_prefix('@') {
                Some(file) => std::fs::read_to_string(file)
                    .with_context(|| format!("cannot read instructions file {file}"))?,
                None => instructions,
            };
            invoke(
                registry,
                "skills_create",
                &[
                    ("name", name),
                    ("description", description),
                    ("instructions", instructions),
                ],
            )
            .await
        }
        SkillCommands::Validate { path } => {
            let result = ctx.skills.validate_path(Path::new(&path));
            println!("{}", result.message);
            if let Some(ref data) = result.data {
                println!("{data}");
            }
            if !result.is_success() {
                bail!("validation failed");
            }
            Ok(())
        }
        SkillCommands::AddFile {
            name,
            file_path,
            content,
        } => {
            let result = ctx.skills.add_file(&name, &file_path, &content);
            println!("{}", result.message);
            if !result.is_success() {
                bail!("add-file failed");
            }
            Ok(())
        }
        SkillCommands::Info { name } => {
            let Some(skill) = ctx.skills.find(&name) else {
                bail!("skill '{name}' not found");
            };
            println!("name:        {}", skill.name);
            println!("description: {}", skill.description);
            println!("path:        {}", skill.path.display());
            if let Some(source) = skill.source {
                println!("source:      {source}");
            }
            if let Some(git_ref) = skill.git_ref {
                println!("ref:         {git_ref}");
            }
            if let Some(at) = skill.installed_at {
                println!("installed:   {at}");
            }
            Ok(())
        }
    }
}
