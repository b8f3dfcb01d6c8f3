//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

fn to_toml(cfg: &Config) -> Result<String, CliError> {
    toml::to_string_pretty(cfg).map_err(|e| CliError::Render(e.to_string()))
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_path(global);
    let color = output::should_color(global.color);

    match args.command {
        ConfigCommand::Show => {
            let cfg = config::resolve_config(global)?;
            if !global.quiet {
                for warning in cfg.validation_warnings() {
                    eprintln!("{}", output::notice(&warning, color));
                }
            }
            let text = to_toml(&cfg)?;
            let out =
                output::render_single(global.output, &cfg, |_| text.clone(), |_| text.clone());
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            config::save_config_to(&Config::default(), &path)?;
            if !global.quiet {
                eprintln!("Wrote default configuration to {}", path.display());
            }
            Ok(())
        }

        ConfigCommand::SetGroupName { pool, name } => {
            let pool = pool.trim().to_owned();
            if pool.is_empty() {
                return Err(CliError::Validation {
                    field: "pool".into(),
                    reason: "pool id cannot be empty".into(),
                });
            }

            let mut cfg = config::read_config_file(&path)?;
            let name = name.map(|n| n.trim().to_owned()).filter(|n| !n.is_empty());
            let message = match name {
                Some(name) => {
                    let message = format!("{pool} is now shown as \"{name}\"");
                    cfg.group_names.insert(pool, name);
                    message
                }
                None => {
                    let message = format!("{pool} uses its default name");
                    cfg.group_names.remove(&pool);
                    message
                }
            };
            config::save_config_to(&cfg, &path)?;

            if !global.quiet {
                for warning in cfg.validation_warnings() {
                    eprintln!("{}", output::notice(&warning, color));
                }
                eprintln!("{message}");
            }
            Ok(())
        }
    }
}
