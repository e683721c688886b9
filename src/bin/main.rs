use clap::Parser;

use somfilter::cli::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.command.run(cli.log_filepath.as_deref()) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
