use clap::Subcommand;
use tasker_core::Config;

/// Keys accepted by `get` and `set`.
const KEYS: &str = "timer.work_minutes, timer.break_minutes, logging.level";
const KEYS_HELP: &str = "Keys: timer.work_minutes, timer.break_minutes, logging.level";

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one value
    #[command(after_help = KEYS_HELP)]
    Get {
        /// Dot-separated key, e.g. "timer.work_minutes"
        key: String,
    },
    /// Change one value and save the file
    #[command(after_help = KEYS_HELP)]
    Set {
        /// Dot-separated key
        key: String,
        /// New value; interval lengths are whole minutes above zero
        value: String,
    },
    /// Print the whole config file
    List,
    /// Overwrite the config file with defaults
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let value = Config::load()?
                .get(&key)
                .ok_or_else(|| format!("unknown key '{key}' (known: {KEYS})"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            // Echo what was stored, which may differ in form from the input.
            let stored = config.get(&key).unwrap_or(value);
            println!("{key} = {stored}");
        }
        ConfigAction::List => {
            print!("{}", Config::load()?.to_toml()?);
        }
        ConfigAction::Reset => {
            let config = Config::default();
            config.save()?;
            println!(
                "config reset: work {} min, break {} min, log level {}",
                config.timer.work_minutes, config.timer.break_minutes, config.logging.level
            );
        }
    }
    Ok(())
}
