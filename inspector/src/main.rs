mod app;

use std::path::PathBuf;

use anyhow::Context;
use winit::event_loop::EventLoop;

use app::{App, StartupFiles};

/// Usage: defect-inspector [MESH] [REGIONS_JSON] [ENVIRONMENT_HDR]
fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args_os().skip(1).map(PathBuf::from);
    let files = StartupFiles {
        mesh: args.next(),
        regions: args.next(),
        environment: args.next(),
    };

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(files);
    event_loop.run_app(&mut app).context("Event loop failed")?;
    Ok(())
}
