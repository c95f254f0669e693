//! `driver` subcommand: manage the kernel driver service behind a device.

use serde::Serialize;

use super::{Config, DriverAction, Result, print_json};
use ctlprobe_lib::driver::{self, DriverLoadOptions, DriverService, DriverState};

#[derive(Serialize)]
struct DriverStatusJson {
    name: String,
    state: String,
    running: bool,
}

pub(super) fn cmd_driver(action: DriverAction, config: &Config, json: bool) -> Result<()> {
    match action {
        DriverAction::Load {
            image,
            name,
            recreate,
            no_start,
        } => {
            let options = load_options(config, recreate, no_start);
            let service = DriverService::load(&image, &name, &options)?;
            if options.start_immediately {
                println!("Driver {} loaded and running.", service.name());
            } else {
                println!("Driver {} installed.", service.name());
            }
        }
        DriverAction::Start { name } => {
            driver::start_driver(&name)?;
            println!("Driver {name} started.");
        }
        DriverAction::Stop { name } => {
            driver::stop_driver(&name)?;
            println!("Driver {name} stopped.");
        }
        DriverAction::Unload { name } => {
            driver::unload_driver(&name)?;
            println!("Driver {name} stopped and removed.");
        }
        DriverAction::Status { name } => {
            let state = driver::query_driver_state(&name)?;
            if json {
                return print_json(&DriverStatusJson {
                    name,
                    state: state.to_string(),
                    running: state == DriverState::Running,
                });
            }
            println!("{name}: {state}");
        }
    }
    Ok(())
}

fn load_options(config: &Config, recreate: bool, no_start: bool) -> DriverLoadOptions {
    DriverLoadOptions {
        recreate_if_exists: recreate,
        start_immediately: !no_start,
        ..config.driver_options()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctlprobe_lib::driver::StartType;

    #[test]
    fn load_options_merge_flags_with_config() {
        let config = Config {
            driver_start_type: StartType::Auto,
            ..Config::default()
        };
        let o = load_options(&config, true, true);
        assert_eq!(o.start_type, StartType::Auto);
        assert!(o.recreate_if_exists);
        assert!(!o.start_immediately);
    }

    #[test]
    fn status_json_shape() {
        let json = serde_json::to_value(DriverStatusJson {
            name: "beep".into(),
            state: DriverState::Stopped.to_string(),
            running: false,
        })
        .unwrap();
        assert_eq!(json["state"], "stopped");
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[cfg(not(windows))]
    #[test]
    fn status_unsupported_off_windows() {
        let err = cmd_driver(
            DriverAction::Status {
                name: "beep".into(),
            },
            &Config::default(),
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Unsupported"));
    }
}
