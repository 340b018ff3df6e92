#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use ndarray::Array1;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use sortedl1::data::{Dataset, load_csv, write_coefficients};
use sortedl1::warnings::take_warnings;
use sortedl1::{
    AlphaType, CdType, Centering, CenteringType, DEFAULT_ALPHA, Interrupt, LambdaType, LossType,
    Scaling, ScalingType, ScreeningType, Slope, SlopeParameters, SlopePath, SolverType, threads,
};

#[derive(Parser)]
#[command(name = "sortedl1", about = "Sorted L-one penalized regression", version)]
struct Cli {
    /// Number of worker threads (defaults to half the hardware threads)
    #[arg(long, global = true, value_name = "N")]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a regularization path over a grid of alpha values
    #[command(about = "Fit a full regularization path (outputs: coefficients.csv)")]
    Path(PathArgs),

    /// Fit the model at a single alpha
    #[command(about = "Fit at a single alpha (outputs: coefficients.csv)")]
    Fit(FitArgs),

    /// Print the effective configuration as TOML
    #[command(about = "Print the configuration that a run would use")]
    Config(ModelArgs),
}

#[derive(Args)]
struct InputArgs {
    /// Path to a CSV file with a header row
    data: PathBuf,

    /// Name of the response column
    #[arg(long, default_value = "y")]
    response: String,

    /// Field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Where to write the coefficients
    #[arg(long, short, default_value = "coefficients.csv")]
    output: PathBuf,
}

/// Options layered on top of the configuration file.
#[derive(Args)]
struct ModelArgs {
    /// TOML file with model options; flags below take precedence
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    loss: Option<LossType>,

    /// Fit without an intercept
    #[arg(long)]
    no_intercept: bool,

    #[arg(long, value_enum)]
    centering: Option<CenteringType>,

    #[arg(long, value_enum)]
    scaling: Option<ScalingType>,

    /// Normalize a copy of X up front instead of on the fly
    #[arg(long)]
    modify_x: bool,

    #[arg(long, value_enum)]
    lambda_type: Option<LambdaType>,

    /// Target false discovery rate of the lambda sequence
    #[arg(long)]
    q: Option<f64>,

    #[arg(long)]
    tol: Option<f64>,

    #[arg(long)]
    max_it: Option<usize>,

    #[arg(long, value_enum)]
    solver: Option<SolverType>,

    #[arg(long, value_enum)]
    screening: Option<ScreeningType>,

    #[arg(long, value_enum)]
    cd_type: Option<CdType>,

    /// Keep the full convergence history of every step
    #[arg(long)]
    diagnostics: bool,
}

#[derive(Args)]
struct PathArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    model: ModelArgs,

    /// Number of alpha values on the automatic grid
    #[arg(long)]
    path_length: Option<usize>,

    /// Smallest alpha as a fraction of the largest
    #[arg(long)]
    alpha_min_ratio: Option<f64>,

    /// Explicit, non-increasing alpha values (comma separated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    alpha: Option<Vec<f64>>,
}

#[derive(Args)]
struct FitArgs {
    #[command(flatten)]
    input: InputArgs,

    #[command(flatten)]
    model: ModelArgs,

    /// Penalty strength
    #[arg(long, conflicts_with = "estimate_alpha")]
    alpha: Option<f64>,

    /// Choose alpha from the estimated noise level (quadratic loss only)
    #[arg(long)]
    estimate_alpha: bool,
}

impl ModelArgs {
    fn parameters(&self) -> Result<SlopeParameters, Box<dyn std::error::Error>> {
        let mut params = match &self.config {
            Some(path) => {
                log::info!("Reading configuration from {}", path.display());
                SlopeParameters::from_file(path)?
            }
            None => SlopeParameters::default(),
        };

        if let Some(loss) = self.loss {
            params.loss = loss;
        }
        if self.no_intercept {
            params.intercept = false;
        }
        if let Some(centering) = self.centering {
            params.centering = Centering::Type(centering);
        }
        if let Some(scaling) = self.scaling {
            params.scaling = Scaling::Type(scaling);
        }
        if self.modify_x {
            params.modify_x = true;
        }
        if let Some(lambda_type) = self.lambda_type {
            params.lambda_type = lambda_type;
        }
        if let Some(q) = self.q {
            params.q = q;
        }
        if let Some(tol) = self.tol {
            params.tol = tol;
        }
        if let Some(max_it) = self.max_it {
            params.max_it = max_it;
        }
        if let Some(solver) = self.solver {
            params.solver = solver;
        }
        if let Some(screening) = self.screening {
            params.screening = screening;
        }
        if let Some(cd_type) = self.cd_type {
            params.hybrid_cd_type = cd_type;
        }
        if self.diagnostics {
            params.diagnostics = true;
        }
        Ok(params)
    }
}

fn delimiter_byte(delimiter: char) -> Result<u8, Box<dyn std::error::Error>> {
    u8::try_from(delimiter).map_err(|_| format!("delimiter '{delimiter}' is not a single byte").into())
}

fn load(input: &InputArgs) -> Result<Dataset, Box<dyn std::error::Error>> {
    println!("Loading data from: {}", input.data.display());
    let data = load_csv(&input.data, &input.response, delimiter_byte(input.delimiter)?)?;
    println!(
        "Loaded {} observations with {} features",
        data.x.nrows(),
        data.x.ncols()
    );
    Ok(data)
}

fn create_progress_bar(len: u64) -> ProgressBar {
    let draw_target = if std::io::stderr().is_terminal() {
        ProgressDrawTarget::stderr_with_hz(20)
    } else {
        ProgressDrawTarget::hidden()
    };

    let pb = ProgressBar::with_draw_target(Some(len), draw_target);
    if let Ok(style) = ProgressStyle::with_template("> [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} steps {msg}") {
        pb.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
    }
    pb
}

fn report(path: &SlopePath, input: &InputArgs, feature_names: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "\n{:>5} {:>12} {:>10} {:>8} {:>8} {:>7} {:>10}",
        "step", "alpha", "dev.ratio", "nonzero", "clusters", "passes", "gap"
    );
    for (step, summary) in path.summaries().iter().enumerate() {
        println!(
            "{:>5} {:>12.4e} {:>10.5} {:>8} {:>8} {:>7} {:>10.2e}{}",
            step,
            summary.alpha,
            summary.deviance_ratio,
            summary.nonzeros,
            summary.clusters,
            summary.passes,
            summary.gap,
            if summary.converged { "" } else { "  (not converged)" }
        );
    }

    write_coefficients(&input.output, path, feature_names)?;
    println!("\nCoefficients saved to: {}", input.output.display());

    let warnings = take_warnings();
    if !warnings.is_empty() {
        println!("{} warning(s) were recorded during fitting; see the log for details.", warnings.len());
    }
    Ok(())
}

fn run_path(args: PathArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut params = args.model.parameters()?;
    if let Some(path_length) = args.path_length {
        params.path_length = path_length;
    }
    if let Some(ratio) = args.alpha_min_ratio {
        params.alpha_min_ratio = Some(ratio);
    }
    let model = Slope::new(params)?;
    let data = load(&args.input)?;

    let alpha = args.alpha.map(Array1::from);
    let steps = alpha.as_ref().map_or(model.parameters().path_length, |a| a.len());
    let pb = create_progress_bar(steps as u64);
    let tick = || {
        pb.inc(1);
        false
    };

    let path = model.path(&data.x, data.y.view(), alpha, None, Some(&tick as Interrupt))?;
    pb.finish_with_message(format!("{} steps fitted", path.len()));

    report(&path, &args.input, &data.feature_names)
}

fn run_fit(args: FitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut params = args.model.parameters()?;
    if args.estimate_alpha {
        params.alpha_type = AlphaType::Estimate;
    }
    let model = Slope::new(params)?;
    let data = load(&args.input)?;

    let alpha = match (args.alpha, model.parameters().alpha_type) {
        (Some(alpha), _) => Some(Array1::from(vec![alpha])),
        (None, AlphaType::Estimate) => None,
        (None, AlphaType::Path) => {
            println!("No alpha given; using alpha = {DEFAULT_ALPHA}");
            Some(Array1::from(vec![DEFAULT_ALPHA]))
        }
    };
    let path = model.path(&data.x, data.y.view(), alpha, None, None)?;
    if let Some(fit) = path.last() {
        println!("Fitted at alpha = {:.6e}", fit.alpha());
    }

    report(&path, &args.input, &data.feature_names)
}

fn print_config(args: ModelArgs) -> Result<(), Box<dyn std::error::Error>> {
    let params = args.parameters()?;
    params.validate()?;
    print!("{}", params.to_toml_string()?);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { threads: workers, command } = Cli::parse();

    if let Some(n) = workers {
        if let Err(e) = threads::set(n) {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }

    let result = match command {
        Some(Commands::Path(args)) => run_path(args),
        Some(Commands::Fit(args)) => run_fit(args),
        Some(Commands::Config(args)) => print_config(args),
        None => Cli::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
