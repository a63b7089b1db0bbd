use std::{error::Error, io};

use clap::Parser;
use searchd_client::cli::{Cli, run};

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; verbosity comes from RUST_LOG
    env_logger::init();

    let cli = Cli::parse();
    let stdin = io::stdin().lock();
    let mut stdout = io::stdout().lock();

    run(cli, stdin, &mut stdout)
}
