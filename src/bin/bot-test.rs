use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use botcheck::{
    BotDefinition, BotTester, FileSource, ScriptedBot, ScriptedBotFactory, SourceRegistry,
    TestCaseRecord, TestOptions,
};
use clap::{error::ErrorKind, CommandFactory, Parser};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bot-test")]
#[command(about = "Run paged conversation test suites against a scripted bot")]
struct Args {
    /// Suite file or directory, optionally keyed by language (`cs=suites/cs`). Repeatable.
    #[arg(long, required_unless_present = "print_schema")]
    suite: Vec<String>,

    /// Bot definition (YAML/JSON)
    #[arg(long, required_unless_present = "print_schema")]
    bot: Option<PathBuf>,

    /// Test options (YAML/JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run only this 1-based page
    #[arg(long, conflicts_with = "all_steps")]
    step: Option<usize>,

    /// Language used to pick the suite and sent to the bot
    #[arg(long)]
    lang: Option<String>,

    /// Walk every page in order and merge the results
    #[arg(long)]
    all_steps: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Write the JSON report to this path (implies --save)
    #[arg(long)]
    out: Option<PathBuf>,

    /// Archive the JSON report under runs/
    #[arg(long)]
    save: bool,

    /// Print the JSON schema of suite files and exit
    #[arg(long)]
    print_schema: bool,
}

/// Builds the source registry from `--suite` values. At most one suite may be
/// given without a language key; it is registered as `default`.
fn registry(suites: &[String]) -> Result<SourceRegistry, String> {
    let unkeyed = suites.iter().filter(|suite| !suite.contains('=')).count();
    if unkeyed > 1 {
        return Err(format!(
            "{unkeyed} suites given without a language key; use --suite <lang>=<path> for all but one"
        ));
    }
    if unkeyed == 1 && suites.len() == 1 {
        return Ok(SourceRegistry::single(FileSource::new(&suites[0])));
    }

    let mut registry = SourceRegistry::by_language();
    for suite in suites {
        let (lang, path) = suite.split_once('=').unwrap_or(("default", suite.as_str()));
        if registry.languages().contains(&lang) {
            return Err(format!("suite language '{lang}' given more than once"));
        }
        registry = registry.with_language(lang, FileSource::new(path));
    }
    Ok(registry)
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn default_out_path() -> PathBuf {
    let ts = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    PathBuf::from(format!("runs/{ts}.json"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn,botcheck=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    if args.print_schema {
        let schema = schemars::schema_for!(Vec<TestCaseRecord>);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let sources = match registry(&args.suite) {
        Ok(sources) => sources,
        Err(message) => Args::command().error(ErrorKind::ArgumentConflict, message).exit(),
    };
    let bot_path = args.bot.as_ref().ok_or("--bot is required")?;

    let options = match &args.config {
        Some(path) => TestOptions::from_path(path)?,
        None => TestOptions::default(),
    };
    let definition = BotDefinition::from_path(bot_path)?;

    let tester = BotTester::new(
        sources,
        Arc::new(ScriptedBotFactory::new(definition.clone())),
    )
    .with_classifier(Arc::new(ScriptedBot::new(definition)))
    .with_options(options);

    let lang = args.lang.as_deref();
    let report = if args.all_steps {
        tester.test_all_steps(lang).await?
    } else {
        tester.test(args.step, lang).await?
    };

    if args.save || args.out.is_some() {
        let out_path = args.out.clone().unwrap_or_else(default_out_path);
        ensure_parent_dir(&out_path)?;
        fs::write(&out_path, serde_json::to_vec_pretty(&report)?)?;
        eprintln!("report written to {}", out_path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.output);
        if !report.output.is_empty() {
            println!();
        }
        print!("{}", report.summary_output);
        if let Some(step) = report.step {
            println!("step {step}/{}", report.step_count);
        }
    }

    if report.is_success() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
