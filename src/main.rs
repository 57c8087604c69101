extern crate env_logger;
#[macro_use]
extern crate log;

use anyhow::Result;
use clap::Parser;

use dechimera::cli::{self, Cli, Commands};
use dechimera::run::{run_aligned, run_clustered, Reports};

fn try_main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    let cli = Cli::parse();

    println!("dechimera v{}", cli::VERSION);

    match &cli.command {
        Commands::Aligned {
            input,
            output,
            reports,
        } => {
            run_aligned(input, output, &Reports::from(reports))?;
        }
        Commands::Clustered {
            input,
            output,
            cb_umi_length,
            cb_length,
            reports,
        } => {
            run_clustered(
                input,
                output,
                *cb_umi_length,
                *cb_length,
                &Reports::from(reports),
            )?;
        }
    };

    info!("Completed successfully.");
    Ok(())
}

fn main() {
    if let Err(err) = try_main() {
        error!("{}", err);

        // report any errors that are produced
        err.chain()
            .skip(1)
            .for_each(|cause| error!("  because: {}", cause));

        std::process::exit(1);
    }
}
