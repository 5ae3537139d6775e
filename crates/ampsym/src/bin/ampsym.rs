//! ampsym - print, evaluate, export, and explore polarized intensity models
//!
//! Every subcommand starts from a session configuration (`--config`, or the defaults) whose
//! model section can be overridden on the command line.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use ampsym::{
    assemble, compare_exports, compile, export_grid, AmpsymError, AmpsymResult, ControlSet,
    GridExport, HeatmapCanvas, IntensityModel, MemoryCanvas, Printer, RedrawOutcome, Session,
    SessionConfig, Sign, Value, Variable,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ampsym")]
#[command(about = "Symbolic polarized-intensity models with interactive heatmaps")]
struct Cli {
    /// Path to a session configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    model: ModelArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Highest partial-wave order
    #[arg(long, global = true)]
    max_order: Option<usize>,

    /// Flip indices, comma separated
    #[arg(long, global = true, value_delimiter = ',', allow_hyphen_values = true)]
    flip: Option<Vec<i64>>,

    /// Azimuthal indices, comma separated
    #[arg(long, global = true, value_delimiter = ',', allow_hyphen_values = true)]
    m_range: Option<Vec<i64>>,

    /// Overall scale
    #[arg(long, global = true)]
    kappa: Option<f64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the assembled formula
    Formula {
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Unfold every pool sum first
        #[arg(long)]
        expanded: bool,
    },

    /// Evaluate the intensity at one angle point
    Evaluate {
        #[arg(long)]
        theta: f64,

        #[arg(long)]
        phi: f64,

        /// Control values as NAME=VALUE, e.g. "A+[0,0] mag=1.5"
        #[arg(long = "set", value_parser = parse_assignment)]
        assignments: Vec<(String, f64)>,
    },

    /// Evaluate the whole grid and write it as JSON
    Export {
        #[arg(long, short)]
        output: PathBuf,

        /// Control values as NAME=VALUE
        #[arg(long = "set", value_parser = parse_assignment)]
        assignments: Vec<(String, f64)>,
    },

    /// Compare two grid exports
    Compare {
        reference: PathBuf,

        candidate: PathBuf,

        #[arg(long, default_value = "1e-6")]
        rel_tolerance: f64,
    },

    /// Run an interactive session reading commands from standard input
    Session,

    /// Open an interactive session in a window
    #[cfg(feature = "gui")]
    Gui,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Latex,
    Json,
}

fn parse_assignment(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got \"{s}\""))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value in \"{s}\": {e}"))?;
    Ok((name.trim().to_string(), value))
}

fn path_str(path: &Path) -> AmpsymResult<&str> {
    path.to_str()
        .ok_or_else(|| AmpsymError::Custom(format!("path {} is not UTF-8", path.display())))
}

fn load_config(cli: &Cli) -> AmpsymResult<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::from_file(path_str(path)?)?,
        None => SessionConfig::default(),
    };
    if let Some(max_order) = cli.model.max_order {
        config.model.max_order = max_order;
    }
    if let Some(flip) = &cli.model.flip {
        config.model.flip_indices = flip.clone();
    }
    if let Some(m_range) = &cli.model.m_range {
        config.model.m_range = m_range.clone();
    }
    if let Some(kappa) = cli.model.kappa {
        config.model.kappa = kappa;
    }
    Ok(config)
}

fn model(config: &SessionConfig) -> AmpsymResult<IntensityModel> {
    assemble(
        config.model.max_order,
        &config.model.flip_indices,
        &config.model.m_range,
    )
}

fn print_formula(config: &SessionConfig, format: Format, expanded: bool) -> AmpsymResult<()> {
    let model = model(config)?;
    let expression = if expanded {
        model.expanded()
    } else {
        model.expression().clone()
    };
    let output = match format {
        Format::Text => Printer::text().render(&expression),
        Format::Latex => Printer::latex().render(&expression),
        Format::Json => serde_json::to_string_pretty(&expression)?,
    };
    println!("{output}");
    Ok(())
}

fn evaluate_point(
    config: &SessionConfig,
    theta: f64,
    phi: f64,
    assignments: &[(String, f64)],
) -> AmpsymResult<f64> {
    let model = model(config)?;
    let mut binding = model.binding();
    binding.bind_symbol(model.kappa(), config.model.kappa);
    let expression = model.expression().substitute(&binding).expand();
    let arguments = expression.sorted_free_variables();
    let function = compile(&expression, &arguments)?;
    let controls = apply(
        ControlSet::for_function(&function, &config.controls),
        assignments,
    )?;
    let values = arguments
        .iter()
        .map(|a| match (a, a.name().as_str()) {
            (Variable::Symbol(_), "theta") => Ok(Value::from(theta)),
            (Variable::Symbol(_), "phi") => Ok(Value::from(phi)),
            _ => controls.value_for(a).map(Value::from),
        })
        .collect::<AmpsymResult<Vec<Value>>>()?;
    let value = function
        .call(&values)?
        .as_scalar()
        .ok_or_else(|| AmpsymError::Custom("expected a scalar intensity".to_string()))?;
    Ok(value.re)
}

fn apply(mut controls: ControlSet, assignments: &[(String, f64)]) -> AmpsymResult<ControlSet> {
    for (name, value) in assignments {
        controls.set(name, *value)?;
    }
    Ok(controls)
}

fn export(
    config: &SessionConfig,
    output: &Path,
    assignments: &[(String, f64)],
) -> AmpsymResult<()> {
    let mut session = Session::from_config(config, MemoryCanvas::new())?;
    for (name, value) in assignments {
        session.set_control(name, *value)?;
    }
    let export = export_grid(&session, path_str(output)?)?;
    info!(
        points = export.intensity.len(),
        output = %output.display(),
        "exported grid"
    );
    Ok(())
}

fn compare(reference: &Path, candidate: &Path, rel_tolerance: f64) -> AmpsymResult<bool> {
    let reference = GridExport::read(path_str(reference)?)?;
    let candidate = GridExport::read(path_str(candidate)?)?;
    let comparison = compare_exports(&reference, &candidate, rel_tolerance)?;
    println!("{}", serde_json::to_string_pretty(&comparison)?);
    Ok(comparison.passed)
}

fn print_controls(session: &Session<HeatmapCanvas>) {
    for (name, slider) in session.controls().iter() {
        let panel = session
            .panels()
            .iter()
            .find(|p| p.controls().contains(name));
        match panel {
            Some(p) if p.collapsed() => {}
            _ => println!(
                "{name} = {:.4} [{:.4}, {:.4}]",
                slider.value(),
                slider.min(),
                slider.max()
            ),
        }
    }
}

fn run_session(config: &SessionConfig) -> AmpsymResult<()> {
    let canvas = HeatmapCanvas::new(&config.canvas.output, config.canvas.scale)?;
    let mut session = Session::from_config(config, canvas)?;
    info!(output = %session.canvas().path().display(), "session ready");
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    print!("> ");
    stdout.flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["quit"] | ["exit"] => break,
            ["controls"] => print_controls(&session),
            ["toggle", panel] => match panel.parse::<Sign>() {
                Ok(sign) => {
                    let collapsed = session.toggle_panel(sign);
                    println!("panel {sign} {}", if collapsed { "collapsed" } else { "expanded" });
                }
                Err(e) => warn!("{e}"),
            },
            ["set", rest @ .., value] if !rest.is_empty() => {
                let name = rest.join(" ");
                match value.parse::<f64>() {
                    Ok(value) => match session.set_control(&name, value) {
                        Ok(RedrawOutcome::Drawn { max, rescaled }) => {
                            println!("drawn (max = {max:.6}, rescaled = {rescaled})")
                        }
                        Ok(RedrawOutcome::Failed { message }) => println!("failed: {message}"),
                        Err(e) => warn!("{e}"),
                    },
                    Err(e) => warn!("invalid value \"{value}\": {e}"),
                }
            }
            _ => warn!("unknown command \"{line}\" (set <control> <value>, toggle <+|->, controls, quit)"),
        }
        print!("> ");
        stdout.flush()?;
    }
    Ok(())
}

fn run(cli: &Cli) -> AmpsymResult<bool> {
    let config = load_config(cli)?;
    match &cli.command {
        Command::Formula { format, expanded } => print_formula(&config, *format, *expanded)?,
        Command::Evaluate {
            theta,
            phi,
            assignments,
        } => println!("{}", evaluate_point(&config, *theta, *phi, assignments)?),
        Command::Export {
            output,
            assignments,
        } => export(&config, output, assignments)?,
        Command::Compare {
            reference,
            candidate,
            rel_tolerance,
        } => return compare(reference, candidate, *rel_tolerance),
        Command::Session => run_session(&config)?,
        #[cfg(feature = "gui")]
        Command::Gui => {
            let canvas = ampsym::render::gui::TextureCanvas::new(config.canvas.scale);
            let session = Session::from_config(&config, canvas)?;
            info!("opening session window");
            ampsym::render::gui::run(session)?
        }
    }
    Ok(true)
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ampsym=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
