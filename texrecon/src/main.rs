use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};
use structopt::StructOpt;

use texrecon::texturing::{SelectViewsCommand, TextureCommand};

#[derive(StructOpt)]
#[structopt(about = "Texture reconstruction for meshes from calibrated photographs")]
struct Opts {
    #[structopt(help = "Log debug messages", long, short = "v")]
    verbose: bool,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    Texture(TextureCommand),
    SelectViews(SelectViewsCommand),
}

fn main() {
    let opts = Opts::from_args();

    let level = if opts.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(err) = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("warning: failed to initialize logging ({})", err);
    }

    let res = match opts.command {
        Command::Texture(command) => command.run(),
        Command::SelectViews(command) => command.run(),
    };

    if let Err(err) = res {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
