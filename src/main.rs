use std::{
    env,
    io::{self, BufReader},
};

use anyhow::bail;
use app::App;
use cmd::Cmd;
use config::Config;

mod api;
mod app;
mod brush;
mod cmd;
mod config;
mod input;
mod math;
mod pool;
mod render;
mod stroke;

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_module(env!("CARGO_CRATE_NAME"), log::LevelFilter::Debug)
        .parse_default_env()
        .init();

    let config = match &*env::args_os().skip(1).collect::<Vec<_>>() {
        [] => {
            log::info!("no config file given, using defaults");
            let config = Config::default();
            config.validate()?;
            config
        }
        [path] => Config::load(path)?,
        _ => {
            bail!("usage: {} [config.toml]", env!("CARGO_PKG_NAME"));
        }
    };

    let event_loop = winit::event_loop::EventLoop::<Cmd>::with_user_event().build()?;
    if config.api.stdin {
        let proxy = event_loop.create_proxy();
        input::spawn(BufReader::new(io::stdin()), move |cmd| {
            drop(proxy.send_event(cmd))
        });
    }

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    match app.take_error() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
