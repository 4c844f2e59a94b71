use clap::Parser;
use miette::Result;
use spk::cli::commands::{completions, entity, init, link, reindex, serve, status};
use spk::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Reset SIGPIPE so piping into `head` and friends exits quietly
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    init_logging(global.verbose);

    match cli.command {
        Commands::Init(args) => init::run(args, &global),
        Commands::Serve(args) => serve::run(args, &global),
        Commands::Status(args) => status::run(args, &global),
        Commands::List(args) => entity::list(args, &global),
        Commands::Show(args) => entity::show(args, &global),
        Commands::Create(args) => entity::create(args, &global),
        Commands::Update(args) => entity::update(args, &global),
        Commands::Patch(args) => entity::patch(args, &global),
        Commands::Delete(args) => entity::delete(args, &global),
        Commands::Search(args) => entity::search(args, &global),
        Commands::Link(cmd) => link::run(cmd, &global),
        Commands::Reindex(args) => reindex::run(args, &global),
        Commands::Completions(args) => completions::run(args),
    }
}

/// Logs go to stderr so command output stays pipeable
fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("spk=debug,tower_http=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("spk=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
