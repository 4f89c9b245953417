use rayon::ThreadPoolBuilder;
use shaker_cli::input::{command, Input};
use shaker_cli::runner::Runner;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("SHAKER_LOG", "error,shaker=info"))
        .init();

    let matches = command().get_matches();

    let threads = matches
        .get_one::<u16>("threads")
        .copied()
        .map(usize::from)
        .unwrap_or_else(num_cpus::get);
    ThreadPoolBuilder::new().num_threads(threads).build_global()?;

    let progress = !matches.get_flag("quiet");
    let settings = Input::from_arguments(&matches)?.build()?;
    Runner::new(settings, progress)?.run()?;
    Ok(())
}
