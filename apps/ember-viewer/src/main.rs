//! Ember glTF viewer
//!
//! Loads a glTF 2.0 scene and renders it with image-based lighting, SSAO and
//! HDR tonemapping.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p ember-viewer -- <path/to/scene.gltf>
//! ```
//!
//! Shaders are read from `shaders/*.spv` and the environment map from
//! `assets/environment.hdr`, both relative to the working directory. A
//! procedural sky is used when the environment map is missing.
//!
//! ## Controls
//!
//! - `W`/`A`/`S`/`D`: move
//! - `Space` / `Ctrl`: up / down
//! - `Shift`: sprint
//! - Mouse: look (while the cursor is locked)
//! - `Escape`: toggle cursor lock
//! - `R`: reload the scene from disk
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod input;

use std::path::PathBuf;

use ember_app::{run_app, AppConfig, AppContext};

use crate::app::Viewer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    View(PathBuf),
    Help,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Command, String> {
    let mut path = None;
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            flag if flag.starts_with('-') => return Err(format!("unknown option '{flag}'")),
            _ if path.is_some() => return Err(format!("unexpected argument '{arg}'")),
            _ => path = Some(PathBuf::from(arg)),
        }
    }
    path.map(Command::View)
        .ok_or_else(|| "missing scene path".to_string())
}

fn main() -> anyhow::Result<()> {
    let path = match parse_args(std::env::args().skip(1)) {
        Ok(Command::View(path)) => path,
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Err(message) => {
            eprintln!("error: {message}\n");
            print_help();
            std::process::exit(2);
        }
    };

    let title = format!("Ember - {}", path.display());
    run_app(
        AppConfig::new(title).with_size(WIDTH, HEIGHT),
        move |ctx: &mut AppContext| Viewer::new(ctx, &path),
    )
}

fn print_help() {
    eprintln!(
        "Ember glTF viewer

USAGE:
    ember-viewer <SCENE>

ARGS:
    <SCENE>    Path to a .gltf or .glb file

OPTIONS:
    -h, --help    Print this help message

CONTROLS:
    WASD          Move
    Space/Ctrl    Up/down
    Shift         Sprint
    Mouse         Look
    Escape        Toggle cursor lock

ENVIRONMENT:
    RUST_LOG      Log filter (default: info)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn positional_path() {
        assert_eq!(
            parse_args(args(&["scene.gltf"])),
            Ok(Command::View(PathBuf::from("scene.gltf")))
        );
    }

    #[test]
    fn help_wins() {
        assert_eq!(parse_args(args(&["scene.gltf", "--help"])), Ok(Command::Help));
        assert_eq!(parse_args(args(&["-h"])), Ok(Command::Help));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["a.gltf", "b.gltf"])).is_err());
        assert!(parse_args(args(&["--fast"])).is_err());
    }
}
