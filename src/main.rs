//! pln CLI: typed-statement knowledge base and reasoning units.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use pln_reasoner::chain::ChainAdapter;
use pln_reasoner::config::SessionConfig;
use pln_reasoner::confirm::{Confirmer, StdinConfirmer, Unattended};
use pln_reasoner::controller::{ReasoningUnit, StagedController, UnitOutcome, parse_goal};
use pln_reasoner::oracle::{
    GiveUp, LlmProofOracle, LlmRelationOracle, LlmTranslator, NoRelations, OllamaClient,
    ProofOracle, RelationOracle, ReplayTranslator, ScriptedRepairs, Translator,
};
use pln_reasoner::paths::{PlnPaths, SessionPaths};
use pln_reasoner::session::Session;
use pln_reasoner::statement::{StatementKind, TypedStatement};
use pln_reasoner::store::{Admission, KnowledgeStore, LoadReport};

#[derive(Parser)]
#[command(name = "pln", version, about = "Typed-statement knowledge base with staged reasoning")]
struct Cli {
    /// Root directory for config and data, instead of the XDG locations.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Session name.
    #[arg(long, global = true, default_value = "default")]
    session: String,

    /// Config file (default: `config.toml` in the config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Knowledge-base file, overriding the config and session layout.
    #[arg(long, global = true)]
    kb: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the knowledge base and report conflicting or unparsable lines.
    Check,

    /// Print admitted statements.
    Show {
        /// Only statements of this kind.
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
    },

    /// Admit statements without chaining.
    Admit {
        /// Statements such as `(: t1 (R X Y))`.
        #[arg(required = true)]
        statements: Vec<String>,
    },

    /// Remove a statement and rewrite the knowledge-base file.
    Remove {
        statement: String,

        /// Also remove statements derived from it.
        #[arg(long)]
        cascade: bool,
    },

    /// Admit a statement and forward-chain its consequences.
    Forward { statement: String },

    /// Backward-chain a goal: a statement or a bare type.
    Prove { goal: String },

    /// Run the reasoning units of a puzzle file (JSON array of
    /// `{"premises": [...], "conclusion": "..."}`).
    Run {
        puzzle: PathBuf,

        /// Replay recorded translations instead of calling the LLM.
        #[arg(long)]
        translations: Option<PathBuf>,

        /// Scripted repair actions (JSON array) for replay runs.
        #[arg(long, requires = "translations")]
        repairs: Option<PathBuf>,

        /// Ask on the terminal about conflicts and failed proofs.
        #[arg(long)]
        interactive: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Type,
    Fact,
    Rule,
}

impl From<KindArg> for StatementKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Type => StatementKind::TypeDeclaration,
            KindArg::Fact => StatementKind::Fact,
            KindArg::Rule => StatementKind::Rule,
        }
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let paths = match &cli.data_dir {
        Some(root) => PlnPaths::rooted(root),
        None => PlnPaths::resolve()?,
    };
    let config_file = cli.config.clone().unwrap_or_else(|| paths.config_file());
    let mut config = SessionConfig::load_or_default(&config_file)?;
    if let Some(kb) = &cli.kb {
        config.knowledge.file = Some(kb.clone());
    }
    let session_paths = paths.session(&cli.session);

    match cli.command {
        Commands::Check => {
            let (adapter, report) = open_adapter(&config, &session_paths)?;
            print_report(&report);
            for statement in adapter.refused() {
                println!("refused by the chaining runtime: {statement}");
            }
            println!("{} statements admitted", adapter.store().len());
            if !report.is_clean() || !adapter.refused().is_empty() {
                miette::bail!("knowledge base is not clean");
            }
        }

        Commands::Show { kind } => {
            let (adapter, _) = open_adapter(&config, &session_paths)?;
            let store = adapter.store();
            let statements: Vec<&TypedStatement> = match kind {
                Some(kind) => store.of_kind(kind.into()).collect(),
                None => store.iter().collect(),
            };
            for statement in statements {
                println!("{statement}");
            }
        }

        Commands::Admit { statements } => {
            let (mut adapter, _) = open_adapter(&config, &session_paths)?;
            for text in statements {
                let statement = TypedStatement::parse(&text)?;
                match adapter.admit(statement.clone())? {
                    Admission::Inserted => println!("admitted {statement}"),
                    Admission::AlreadyPresent => println!("already present {statement}"),
                    Admission::Conflict(conflict) => {
                        println!("conflict: {}", conflict.incoming_statement());
                        println!("  existing: {}", conflict.existing_statement());
                    }
                }
            }
        }

        Commands::Remove { statement, cascade } => {
            let (mut adapter, _) = open_adapter(&config, &session_paths)?;
            let statement = TypedStatement::parse(&statement)?;
            let removed = if cascade {
                adapter.retract(&statement)?
            } else if adapter.remove(&statement)? {
                vec![statement]
            } else {
                Vec::new()
            };
            if removed.is_empty() {
                println!("not present");
            } else {
                for statement in &removed {
                    println!("removed {statement}");
                }
                adapter.persist()?;
            }
        }

        Commands::Forward { statement } => {
            let (mut adapter, _) = open_adapter(&config, &session_paths)?;
            let statement = TypedStatement::parse(&statement)?;
            let outcome = adapter.add_and_forward_chain(statement.clone())?;
            if let Some(conflict) = outcome.admission.conflict() {
                println!("conflict: {}", conflict.incoming_statement());
                println!("  existing: {}", conflict.existing_statement());
                return Ok(());
            }
            for derivation in &outcome.derived {
                println!("{}  [{}]", derivation.statement, derivation.schema);
            }
            for conflict in &outcome.conflicts {
                println!("refused: {}", conflict.incoming_statement());
                println!("  existing: {}", conflict.existing_statement());
            }
            println!("{} derived", outcome.derived.len());
        }

        Commands::Prove { goal } => {
            let (adapter, _) = open_adapter(&config, &session_paths)?;
            let goal = parse_goal(&goal)?;
            let search = adapter.backward_chain(&goal)?;
            for step in &search.steps {
                println!("{step}");
            }
            if search.proven {
                for proof in &search.proofs {
                    println!("proof: {proof}");
                }
            } else {
                println!("not proven: {goal}");
            }
        }

        Commands::Run {
            puzzle,
            translations,
            repairs,
            interactive,
        } => {
            let json = std::fs::read_to_string(&puzzle).into_diagnostic()?;
            let units = ReasoningUnit::parse_all(&json).into_diagnostic()?;

            let (translator, relations, proof_oracle): (
                Box<dyn Translator>,
                Box<dyn RelationOracle>,
                Box<dyn ProofOracle>,
            ) = match translations {
                Some(path) => {
                    let proof_oracle: Box<dyn ProofOracle> = match repairs {
                        Some(path) => {
                            let json = std::fs::read_to_string(&path).into_diagnostic()?;
                            Box::new(ScriptedRepairs::from_json(&json)?)
                        }
                        None => Box::new(GiveUp),
                    };
                    (
                        Box::new(ReplayTranslator::from_file(&path)?),
                        Box::new(NoRelations),
                        proof_oracle,
                    )
                }
                None => {
                    let client = OllamaClient::connect(config.llm.clone())?;
                    println!("Using LLM model {}", client.model());
                    (
                        Box::new(LlmTranslator::new(client.clone())),
                        Box::new(LlmRelationOracle::new(client.clone())),
                        Box::new(LlmProofOracle::new(client)),
                    )
                }
            };
            let confirmer: Box<dyn Confirmer> = if interactive {
                Box::new(StdinConfirmer::new())
            } else {
                Box::new(Unattended)
            };

            let (session, report) = Session::open(&config, &session_paths, relations)?;
            print_report(&report);
            let mut controller = StagedController::new(session, translator)
                .with_config(config.controller.clone())
                .with_repair(config.repair.clone(), proof_oracle)
                .with_confirmer(confirmer);

            let mut committed = 0;
            for (i, unit) in units.iter().enumerate() {
                match controller.run_unit(unit)? {
                    UnitOutcome::Committed { proofs, derived, .. } => {
                        committed += 1;
                        println!("unit {}: committed ({derived} derived)", i + 1);
                        for search in &proofs {
                            match search.proofs.first() {
                                Some(proof) => println!("  {proof}"),
                                None => println!("  {} (accepted unproven)", search.goal),
                            }
                        }
                    }
                    UnitOutcome::RolledBack { reason, discarded } => {
                        println!("unit {}: rolled back ({reason})", i + 1);
                        for sentence in &discarded {
                            println!("  discarded: {sentence}");
                        }
                    }
                }
            }
            controller.finish()?;
            println!("{committed}/{} units committed", units.len());
        }
    }

    Ok(())
}

/// Load the knowledge base and wrap it in the local chaining runtime.
fn open_adapter(config: &SessionConfig, paths: &SessionPaths) -> Result<(ChainAdapter, LoadReport)> {
    let file = config.knowledge.knowledge_file(paths);
    let (store, report) = KnowledgeStore::load(&file, config.knowledge.read_only)?;
    let adapter = ChainAdapter::local(store, config.chaining.clone())?;
    Ok((adapter, report))
}

fn print_report(report: &LoadReport) {
    for (line, conflict) in &report.conflicts {
        println!("line {line}: conflict: {}", conflict.incoming_statement());
        println!("  existing: {}", conflict.existing_statement());
    }
    for (line, error) in &report.parse_errors {
        println!("line {line}: {error}");
    }
    for (line, statement) in &report.refused {
        println!("line {line}: variable witness: {statement}");
    }
}
