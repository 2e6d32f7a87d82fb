//! Name-based processor construction.

use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::{bail, ensure, Context};

use super::{
    ChromMethod, ChromProcessor, FilteredProcessor, GreenProcessor, NullProcessor, Processor,
};
use crate::filter::{DigitalFilter, MovingAvg};

/// Describes a [`Processor`] by name and keyword arguments.
///
/// The textual form is `name` or `name(key=value, ...)`, for example `chrom(winsize=30,
/// method=fixed)`. Every processor also accepts these arguments:
///
/// - `bandpass=LOW-HIGH` applies a band-pass filter with corner frequencies in Hz, for video at
///   `fs` frames per second (default 30).
/// - `smooth=N` applies an `N`-frame moving average, after the band-pass filter.
///
/// | name    | arguments                                  |
/// |---------|--------------------------------------------|
/// | `null`  |                                            |
/// | `green` |                                            |
/// | `chrom` | `winsize` (default 45), `method` (`xovery` or `fixed`) |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    pub name: String,
    pub kwargs: BTreeMap<String, String>,
}

impl ProcessorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kwargs: BTreeMap::new(),
        }
    }

    /// Adds a keyword argument.
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.kwargs.insert(key.into(), value.to_string());
        self
    }

    /// Creates the described processor.
    ///
    /// Returns an error if the name is unknown, or if an argument is unknown or invalid.
    pub fn build(&self) -> anyhow::Result<Box<dyn Processor>> {
        let mut kwargs = Kwargs {
            name: &self.name,
            map: self.kwargs.clone(),
        };
        let smooth = kwargs.parse::<usize>("smooth")?;
        let bandpass = kwargs.parse::<Band>("bandpass")?;
        let fs = kwargs.parse::<f64>("fs")?;

        let processor: Box<dyn Processor> = match self.name.as_str() {
            "null" => Box::new(NullProcessor),
            "green" => Box::new(GreenProcessor::new()),
            "chrom" => {
                let winsize = kwargs.parse::<usize>("winsize")?.unwrap_or(45);
                ensure!(winsize > 0, "`winsize` of `chrom` must be positive");
                let method = kwargs
                    .parse::<ChromMethod>("method")?
                    .unwrap_or_default();
                Box::new(ChromProcessor::new(winsize, method))
            }
            other => bail!("unknown processor '{other}'"),
        };
        kwargs.finish()?;

        let processor: Box<dyn Processor> = match bandpass {
            Some(Band(low, high)) => {
                let filter = DigitalFilter::bandpass(low, high, fs.unwrap_or(DEFAULT_FS))?;
                Box::new(FilteredProcessor::new(processor, filter))
            }
            None if fs.is_some() => bail!("`fs` is only used together with `bandpass`"),
            None => processor,
        };
        match smooth {
            Some(0) => bail!("`smooth` window of `{}` must be positive", self.name),
            Some(window) => Ok(Box::new(FilteredProcessor::new(
                processor,
                MovingAvg::new(window),
            ))),
            None => Ok(processor),
        }
    }
}

const DEFAULT_FS: f64 = 30.0;

/// Pass band in Hz, written as `LOW-HIGH`.
struct Band(f64, f64);

impl FromStr for Band {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (low, high) = s
            .split_once('-')
            .context("expected a frequency range like `0.7-3.5`")?;
        Ok(Self(low.trim().parse()?, high.trim().parse()?))
    }
}

struct Kwargs<'a> {
    name: &'a str,
    map: BTreeMap<String, String>,
}

impl Kwargs<'_> {
    fn parse<T: FromStr>(&mut self, key: &str) -> anyhow::Result<Option<T>>
    where
        T::Err: fmt::Display,
    {
        let Some(raw) = self.map.remove(key) else {
            return Ok(None);
        };
        match raw.parse() {
            Ok(value) => Ok(Some(value)),
            Err(e) => bail!(
                "invalid value '{raw}' for argument `{key}` of `{}`: {e}",
                self.name
            ),
        }
    }

    fn finish(self) -> anyhow::Result<()> {
        if let Some(key) = self.map.keys().next() {
            bail!("unknown argument `{key}` for processor `{}`", self.name);
        }
        Ok(())
    }
}

impl FromStr for ProcessorConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, args) = match s.split_once('(') {
            Some((name, rest)) => {
                let args = rest
                    .strip_suffix(')')
                    .with_context(|| format!("missing closing parenthesis in '{s}'"))?;
                (name.trim(), Some(args))
            }
            None => (s, None),
        };
        ensure!(!name.is_empty(), "processor name must not be empty");

        let mut config = Self::new(name);
        for arg in args.into_iter().flat_map(|a| a.split(',')) {
            let arg = arg.trim();
            if arg.is_empty() {
                continue;
            }
            let (key, value) = arg
                .split_once('=')
                .with_context(|| format!("expected `key=value`, got '{arg}'"))?;
            let key = key.trim();
            let old = config
                .kwargs
                .insert(key.to_string(), value.trim().to_string());
            ensure!(old.is_none(), "duplicate argument `{key}` for processor `{name}`");
        }
        Ok(config)
    }
}

impl fmt::Display for ProcessorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.kwargs.is_empty() {
            f.write_str("(")?;
            for (i, (key, value)) in self.kwargs.iter().enumerate() {
                if i != 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse() {
        let config: ProcessorConfig = "chrom(winsize=30, method=fixed)".parse().unwrap();
        assert_eq!(
            config,
            ProcessorConfig::new("chrom")
                .with_kwarg("winsize", 30)
                .with_kwarg("method", "fixed")
        );
        assert_eq!(config.to_string(), "chrom(method=fixed, winsize=30)");

        let config: ProcessorConfig = " green ".parse().unwrap();
        assert_eq!(config, ProcessorConfig::new("green"));

        assert!("chrom(winsize=30".parse::<ProcessorConfig>().is_err());
        assert!("chrom(winsize)".parse::<ProcessorConfig>().is_err());
        assert!("(a=b)".parse::<ProcessorConfig>().is_err());

        let err = "chrom(winsize=3, winsize=4)"
            .parse::<ProcessorConfig>()
            .err()
            .unwrap();
        assert!(err.to_string().contains("duplicate argument `winsize`"), "{err}");
        assert!("green(smooth=3,smooth = 3)".parse::<ProcessorConfig>().is_err());
    }

    #[test]
    fn build() {
        let p = ProcessorConfig::new("green").build().unwrap();
        assert_eq!(p.name(), "GreenChannel");

        let p = "chrom(method=fixed, smooth=3)"
            .parse::<ProcessorConfig>()
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(p.name(), "FilteredChrom(fixed)");

        let p = "green(bandpass=0.7-3.5, fs=25, smooth=2)"
            .parse::<ProcessorConfig>()
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(p.name(), "FilteredFilteredGreenChannel");

        let p = ProcessorConfig::new("null").build().unwrap();
        assert_eq!(p.to_string(), "Processor");
    }

    #[test]
    fn build_errors() {
        let err = ProcessorConfig::new("pos").build().err().unwrap();
        assert!(err.to_string().contains("unknown processor"), "{err}");

        let err = ProcessorConfig::new("green")
            .with_kwarg("winsize", 3)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("`winsize`"), "{err}");

        let err = ProcessorConfig::new("chrom")
            .with_kwarg("winsize", "many")
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("invalid value 'many'"), "{err}");

        assert!(ProcessorConfig::new("chrom")
            .with_kwarg("winsize", 0)
            .build()
            .is_err());
        assert!(ProcessorConfig::new("green")
            .with_kwarg("smooth", 0)
            .build()
            .is_err());
        assert!(ProcessorConfig::new("green")
            .with_kwarg("bandpass", "3.5-0.7")
            .build()
            .is_err());
        assert!(ProcessorConfig::new("green")
            .with_kwarg("bandpass", "fast")
            .build()
            .is_err());
        assert!(ProcessorConfig::new("green")
            .with_kwarg("fs", 30)
            .build()
            .is_err());
    }
}
