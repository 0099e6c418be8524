mod actions;
mod cli;
mod config;
mod gestures;
mod ipc;
mod landmarks;
mod logging;
mod pose;
mod recognizer;
mod smoother;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
