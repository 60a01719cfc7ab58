//! DV-040: CLI subcommands — init, validate, run, verify, grade, compare.

use crate::core::pipeline::{Grade, Verifier};
use crate::core::{checker, parser, state, types};
use crate::engine;
use clap::{Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// Program sublanguage selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[clap(rename_all = "kebab_case")]
pub enum Lang {
    #[value(alias = "expr")]
    Expression,
    #[value(alias = "sql")]
    Query,
}

impl From<Lang> for types::Sublanguage {
    fn from(lang: Lang) -> Self {
        match lang {
            Lang::Expression => types::Sublanguage::Expression,
            Lang::Query => types::Sublanguage::Query,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter problem bundle
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate a problem bundle without executing anything
    Validate {
        /// Path to problem.yaml
        #[arg(short, long, default_value = "problem.yaml")]
        file: PathBuf,
    },

    /// Execute one program against the bundle's input tables
    Run {
        /// Path to problem.yaml
        #[arg(short, long, default_value = "problem.yaml")]
        file: PathBuf,

        /// Sublanguage of the program
        #[arg(short, long, value_enum)]
        lang: Lang,

        /// Program file (default: the bundle's reference solution)
        #[arg(short, long)]
        program: Option<PathBuf>,

        /// Engine configuration (verifier.yaml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the relation as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run both reference solutions and certify they agree
    Verify {
        /// Path to problem.yaml
        #[arg(short, long, default_value = "problem.yaml")]
        file: PathBuf,

        /// Engine configuration (verifier.yaml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// State directory for the event log
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Write the bundle with its canonical output to this path
        #[arg(long)]
        emit: Option<PathBuf>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Grade a submission against the bundle's expected output
    Grade {
        /// Path to problem.yaml
        #[arg(short, long, default_value = "problem.yaml")]
        file: PathBuf,

        /// Sublanguage of the submission
        #[arg(short, long, value_enum)]
        lang: Lang,

        /// Submission file
        #[arg(short, long)]
        program: PathBuf,

        /// Engine configuration (verifier.yaml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// State directory for the event log
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },

    /// Compare two table files (JSON or YAML)
    Compare {
        /// Produced table
        actual: PathBuf,

        /// Expected table
        expected: PathBuf,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Run {
            file,
            lang,
            program,
            config,
            json,
        } => cmd_run(&file, lang, program.as_deref(), config.as_deref(), json),
        Commands::Verify {
            file,
            config,
            state_dir,
            emit,
            json,
        } => cmd_verify(&file, config.as_deref(), &state_dir, emit.as_deref(), json),
        Commands::Grade {
            file,
            lang,
            program,
            config,
            state_dir,
        } => cmd_grade(&file, lang, &program, config.as_deref(), &state_dir),
        Commands::Compare { actual, expected } => cmd_compare(&actual, &expected),
        Commands::Completions { shell } => {
            let mut command = Commands::augment_subcommands(clap::Command::new("dualverify"));
            clap_complete::generate(shell, &mut command, "dualverify", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let bundle_path = path.join("problem.yaml");
    if bundle_path.exists() {
        return Err(format!("{} already exists", bundle_path.display()));
    }
    std::fs::create_dir_all(path)
        .map_err(|e| format!("cannot create dir {}: {}", path.display(), e))?;
    std::fs::write(&bundle_path, parser::PROBLEM_TEMPLATE)
        .map_err(|e| format!("cannot write {}: {}", bundle_path.display(), e))?;

    println!("Initialized problem bundle at {}", path.display());
    println!("  Created: {}", bundle_path.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let problem = parser::parse_problem_file(file)?;
    let errors = parser::validate_problem(&problem);

    if errors.is_empty() {
        println!(
            "OK: {} ({}, {} tables)",
            problem.topic,
            problem.difficulty,
            problem.input_tables.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Parse and validate a bundle, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<types::Problem, String> {
    let problem = parser::parse_problem_file(file)?;
    let errors = parser::validate_problem(&problem);
    if errors.is_empty() {
        return Ok(problem);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err("validation failed".to_string())
}

fn read_program(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))
}

/// Reference solution of the bundle for one sublanguage.
fn reference_solution(problem: &types::Problem, lang: Lang) -> Result<String, String> {
    let (field, text) = match lang {
        Lang::Expression => ("expression_solution", &problem.expression_solution),
        Lang::Query => ("query_solution", &problem.query_solution),
    };
    text.clone()
        .ok_or_else(|| format!("bundle has no {}", field))
}

fn cmd_run(
    file: &Path,
    lang: Lang,
    program: Option<&Path>,
    config: Option<&Path>,
    json: bool,
) -> Result<(), String> {
    let problem = parse_and_validate(file)?;
    let config = parser::load_config(config)?;
    let text = match program {
        Some(path) => read_program(path)?,
        None => reference_solution(&problem, lang)?,
    };
    let inputs = parser::relations(&problem)?;
    let program = types::Program {
        sublanguage: lang.into(),
        text,
    };

    let output = engine::execute(&program, &inputs, &config.execution).map_err(|d| d.to_string())?;
    if json {
        let out = serde_json::to_string_pretty(&output)
            .map_err(|e| format!("JSON serialize error: {}", e))?;
        println!("{}", out);
    } else {
        print!("{}", output);
    }
    Ok(())
}

fn cmd_verify(
    file: &Path,
    config: Option<&Path>,
    state_dir: &Path,
    emit: Option<&Path>,
    json: bool,
) -> Result<(), String> {
    let problem = parse_and_validate(file)?;
    let config = parser::load_config(config)?;
    let expression = reference_solution(&problem, Lang::Expression)?;
    let query = reference_solution(&problem, Lang::Query)?;
    let inputs = parser::relations(&problem)?;

    let verifier = Verifier::new(config).with_state_dir(state_dir);
    let result = verifier.verify(&expression, &query, &inputs);

    if json {
        let out = serde_json::to_string_pretty(&result)
            .map_err(|e| format!("JSON serialize error: {}", e))?;
        println!("{}", out);
    } else {
        println!("{}", result);
    }

    let types::VerificationResult::Verified { canonical } = &result else {
        return Err(format!("verification failed: {}", result.label()));
    };
    if let Some(stored) = parser::expected_relation(&problem)? {
        if let checker::Comparison::Mismatch(d) = checker::compare(canonical, &stored) {
            eprintln!("WARN: stored expected_output differs from canonical output: {}", d);
        }
    }
    if let Some(out) = emit {
        state::save_problem(out, &state::with_canonical(&problem, canonical)?)?;
        println!("  Wrote: {}", out.display());
    }
    Ok(())
}

fn cmd_grade(
    file: &Path,
    lang: Lang,
    program: &Path,
    config: Option<&Path>,
    state_dir: &Path,
) -> Result<(), String> {
    let problem = parse_and_validate(file)?;
    let config = parser::load_config(config)?;
    let canonical = parser::expected_relation(&problem)?
        .ok_or_else(|| format!("{} has no expected_output; run verify --emit first", file.display()))?;
    let inputs = parser::relations(&problem)?;
    let submission = types::Program {
        sublanguage: lang.into(),
        text: read_program(program)?,
    };

    let grade = Verifier::new(config)
        .with_state_dir(state_dir)
        .grade(&submission, &inputs, &canonical);
    println!("{}", grade);
    match grade {
        Grade::Correct => Ok(()),
        other => Err(format!("submission {}", other.label())),
    }
}

fn cmd_compare(actual: &Path, expected: &Path) -> Result<(), String> {
    let a = parser::load_table(actual)?;
    let b = parser::load_table(expected)?;
    match checker::compare(&a, &b) {
        checker::Comparison::Match => {
            let (rows, cols) = a.shape();
            println!("MATCH ({} rows, {} columns)", rows, cols);
            Ok(())
        }
        checker::Comparison::Mismatch(d) => {
            println!("MISMATCH: {}", d);
            Err(format!("{}", d.kind))
        }
    }
}
