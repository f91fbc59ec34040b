use crate::{
    get_config_dir,
    Lang,
};
use eyre::{
    bail,
    eyre,
    Context as _,
    Result,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    collections::HashMap,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

const DEFAULT_STRATEGY: &str = include_str!("default-strategy.yaml");
const STRATEGY_FILE: &str = "strategy.yaml";

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const MONTH: u64 = 30 * DAY;

/// Collection strategy: window bounds, sampling and output defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub min_duration: String,
    pub max_duration: String,
    pub default_range: String,
    pub awr_timeout: String,
    pub sample_interval: String,
    pub sample_count: u32,
    pub output: PathBuf,
    pub language: Lang,
    #[serde(default)]
    pub discard_networks: Vec<String>,
}

impl Default for Strategy {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_STRATEGY).expect("Failed to parse default strategy")
    }
}

impl config::Source for Strategy {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new((*self).clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        let mut cache = HashMap::<String, config::Value>::new();
        cache.insert("min_duration".to_string(), self.min_duration.clone().into());
        cache.insert("max_duration".to_string(), self.max_duration.clone().into());
        cache.insert("default_range".to_string(), self.default_range.clone().into());
        cache.insert("awr_timeout".to_string(), self.awr_timeout.clone().into());
        cache.insert("sample_interval".to_string(), self.sample_interval.clone().into());
        cache.insert("sample_count".to_string(), (self.sample_count as u64).into());
        cache.insert("output".to_string(), self.output.to_string_lossy().to_string().into());
        cache.insert("language".to_string(), self.language.to_string().into());
        cache.insert(
            "discard_networks".to_string(),
            self.discard_networks
                .iter()
                .map(|ea| config::Value::from(ea.clone()))
                .collect::<Vec<_>>()
                .into(),
        );
        Ok(cache)
    }
}

/// Values given on the command line that take precedence over every strategy file.
#[derive(Clone, Debug, Default)]
pub struct StrategyOverrides {
    pub output: Option<PathBuf>,
    pub language: Option<Lang>,
}

impl config::Source for StrategyOverrides {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new((*self).clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        let mut cache = HashMap::<String, config::Value>::new();
        if let Some(output) = &self.output {
            cache.insert("output".to_string(), output.to_string_lossy().to_string().into());
        }
        if let Some(language) = self.language {
            cache.insert("language".to_string(), language.to_string().into());
        }
        Ok(cache)
    }
}

impl Strategy {
    /// Layers the embedded defaults, `strategy.yaml` from the config dir, an
    /// optional explicit file and finally the command line overrides.
    pub fn new(file: Option<&Path>, overrides: StrategyOverrides) -> Result<Self> {
        let config_dir = get_config_dir();
        let mut builder = config::Config::builder().add_source(Strategy::default());

        builder = builder.add_source(
            config::File::from(config_dir.join(STRATEGY_FILE))
                .format(config::FileFormat::Yaml)
                .required(false),
        );

        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file).format(config::FileFormat::Yaml).required(true));
        }

        builder = builder.add_source(overrides);

        let strategy: Self = builder
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .context("Failed to load strategy")?;
        strategy.validate()?;
        debug!(?strategy, "strategy loaded");
        Ok(strategy)
    }

    fn validate(&self) -> Result<()> {
        let (min, max) = self.min_and_max_duration()?;
        if min > max {
            bail!(
                "min_duration {} is greater than max_duration {}",
                self.min_duration,
                self.max_duration
            );
        }
        self.default_range()?;
        self.awr_timeout()?;
        self.sample_interval()?;
        if self.sample_count == 0 {
            bail!("sample_count must be at least 1");
        }
        Ok(())
    }

    pub fn min_and_max_duration(&self) -> Result<(Duration, Duration)> {
        let min = parse_range(&self.min_duration).wrap_err("min_duration")?;
        let max = parse_range(&self.max_duration).wrap_err("max_duration")?;
        Ok((min, max))
    }

    pub fn default_range(&self) -> Result<Duration> {
        parse_range(&self.default_range).wrap_err("default_range")
    }

    pub fn awr_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.awr_timeout)
            .map_err(|e| eyre!("Invalid awr_timeout '{}': {}", self.awr_timeout, e))
    }

    pub fn sample_interval(&self) -> Result<Duration> {
        humantime::parse_duration(&self.sample_interval)
            .map_err(|e| eyre!("Invalid sample_interval '{}': {}", self.sample_interval, e))
    }

    pub fn is_discard_network(&self, name: &str) -> bool {
        self.discard_networks.iter().any(|prefix| name.starts_with(prefix.as_str()))
    }
}

/// Parses a collection range such as `30m`, `2h`, `1d` or `1M` (30 days).
pub fn parse_range(range: &str) -> Result<Duration> {
    let range = range.trim();
    let Some(unit) = range.chars().last() else {
        bail!("empty range");
    };
    let amount: u64 = range[..range.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| eyre!("Invalid range '{range}'"))?;
    let seconds = match unit {
        'M' => MONTH,
        'd' => DAY,
        'h' => HOUR,
        'm' => MINUTE,
        _ => bail!("Invalid range unit in '{range}'"),
    };
    if amount == 0 {
        bail!("Range '{range}' must be positive");
    }
    Ok(Duration::from_secs(amount * seconds))
}
