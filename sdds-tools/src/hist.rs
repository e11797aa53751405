use std::path::PathBuf;
use std::str::FromStr;

use itertools::Itertools;
use log::debug;
use sdds::dtype::{SType, TypedBuffer};
use sdds::error::{SddsResult, sdds_bail};
use sdds::io::EngineConfig;
use sdds::{
    ColumnDefinition, InputTarget, ParameterDefinition, SddsOpenOptions, copy_parameters,
};

use crate::files::{CommonArgs, Files};

/// A numeric window rows must fall in to be histogrammed.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub lower: f64,
    pub upper: f64,
}

impl FromStr for Filter {
    type Err = String;

    /// `column,lower,upper`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((column, lower, upper)) = s.split(',').map(str::trim).collect_tuple() else {
            return Err(format!("expected column,lower,upper, not {s}"));
        };
        let bound = |text: &str| {
            text.parse::<f64>()
                .map_err(|_| format!("invalid filter limit {text}"))
        };
        Ok(Self {
            column: column.to_string(),
            lower: bound(lower)?,
            upper: bound(upper)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cdf {
    #[default]
    Off,
    /// Write the CDF next to the frequencies.
    With,
    /// Write the CDF instead of the frequencies.
    Only,
}

impl FromStr for Cdf {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(Cdf::With),
            "only" => Ok(Cdf::Only),
            other => Err(format!("unknown cdf keyword {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Normalize {
    /// Frequencies sum to 1.
    Sum,
    /// The histogram integrates to 1.
    Area,
    /// The tallest bin is 1.
    Peak,
}

impl Normalize {
    fn name(self) -> &'static str {
        match self {
            Normalize::Sum => "sum",
            Normalize::Area => "area",
            Normalize::Peak => "peak",
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct HistArgs {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,

    /// Column to histogram.
    #[arg(long)]
    pub data_column: String,

    #[arg(long, default_value_t = 20)]
    pub bins: usize,

    /// Lower edge of the first bin. Defaults to just below the smallest value.
    #[arg(long)]
    pub lower_limit: Option<f64>,

    /// Upper edge of the last bin. Defaults to just above the largest value.
    #[arg(long)]
    pub upper_limit: Option<f64>,

    /// Only histogram rows whose filter column lies within the limits.
    #[arg(long, value_name = "column,lower,upper", value_parser = Filter::from_str)]
    pub filter: Option<Filter>,

    /// Add a cumulative distribution column.
    #[arg(
        long,
        value_name = "only",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "",
        value_parser = Cdf::from_str
    )]
    pub cdf: Option<Cdf>,

    #[arg(
        long,
        value_enum,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "sum"
    )]
    pub normalize: Option<Normalize>,

    /// Add the mean, rms and standard deviation of the data as parameters.
    #[arg(long)]
    pub statistics: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Bin counts over a fixed range.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub lower: f64,
    pub width: f64,
    pub counts: Vec<f64>,
    /// Values that fell inside the range.
    pub binned: usize,
}

impl Histogram {
    /// Count `data` into `bins` equal bins spanning `lower..=upper`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(data: &[f64], bins: usize, lower: f64, upper: f64) -> Self {
        let width = (upper - lower) / bins as f64;
        let mut counts = vec![0.0; bins];
        let mut binned = 0;
        for &value in data {
            if !(lower..=upper).contains(&value) {
                continue;
            }
            let bin = ((value - lower) / width).floor();
            let bin = if bin < 0.0 { 0 } else { bin as usize };
            counts[bin.min(bins - 1)] += 1.0;
            binned += 1;
        }
        Self {
            lower,
            width,
            counts,
            binned,
        }
    }

    pub fn centers(&self) -> Vec<f64> {
        (0..self.counts.len())
            .map(|i| self.lower + (i as f64 + 0.5) * self.width)
            .collect()
    }

    /// Running fraction of the binned values, ending at 1 when anything was binned.
    pub fn cdf(&self) -> Vec<f64> {
        let total: f64 = self.counts.iter().sum();
        if total == 0.0 {
            return vec![0.0; self.counts.len()];
        }
        self.counts
            .iter()
            .scan(0.0, |running, count| {
                *running += count;
                Some(*running / total)
            })
            .collect()
    }

    pub fn normalize(&mut self, mode: Normalize) {
        let norm = match mode {
            Normalize::Peak => self.counts.iter().copied().fold(0.0, f64::max),
            Normalize::Sum => self.counts.iter().sum(),
            Normalize::Area => self.counts.iter().sum::<f64>() * self.width,
        };
        if norm != 0.0 {
            for count in &mut self.counts {
                *count /= norm;
            }
        }
    }
}

/// Limits of the histogram range, widened slightly so the extreme values land inside.
fn limits(data: &[f64], lower: Option<f64>, upper: Option<f64>) -> (f64, f64) {
    let (min, max) = match data.iter().copied().minmax() {
        itertools::MinMaxResult::NoElements => (0.0, 0.0),
        itertools::MinMaxResult::OneElement(v) => (v, v),
        itertools::MinMaxResult::MinMax(min, max) => (min, max),
    };
    let range = max - min;
    let mut lo = lower.unwrap_or(min - range * 1e-7);
    let mut hi = upper.unwrap_or(max + range * 1e-7);
    if hi == lo {
        if hi.abs() < f64::MIN_POSITIVE.sqrt() {
            hi = f64::MIN_POSITIVE.sqrt();
            lo = -hi;
        } else {
            let spread = hi.abs() * (1.0 + 2.0 * f64::EPSILON);
            hi += spread;
            lo -= spread;
        }
    }
    (lo, hi)
}

fn moments(data: &[f64]) -> (f64, f64, f64) {
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let rms = (data.iter().map(|v| v * v).sum::<f64>() / n).sqrt();
    let stdev = if data.len() > 1 {
        (data.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };
    (mean, rms, stdev)
}

/// Histogram one column per page.
pub fn exec_hist(args: HistArgs, config: EngineConfig) -> SddsResult<()> {
    if args.bins == 0 {
        sdds_bail!(Usage: "at least one bin is required");
    }
    if let (Some(lo), Some(hi)) = (args.lower_limit, args.upper_limit) {
        if lo >= hi {
            sdds_bail!(Usage: "the lower limit must be below the upper limit");
        }
    }
    let files = Files::resolve(args.input.clone(), args.output.clone(), &args.common)?;
    let input_name = match &files.input {
        InputTarget::File(path) => path.display().to_string(),
        InputTarget::Stdin => "stdin".to_string(),
    };
    let mut input = SddsOpenOptions::new().open_target(&files.input)?;
    let data_def = input.layout().column(&args.data_column)?.clone();
    if !data_def.stype.is_numeric() {
        sdds_bail!(TypeMismatch: "column {} is not numeric", args.data_column);
    }
    if let Some(filter) = &args.filter {
        input.layout().require_column(&filter.column)?;
    }
    let cdf = args.cdf.unwrap_or_default();
    let cdf_name = format!("{}Cdf", args.data_column);

    let mut output = args.common.write_options(config).create_target(&files.output.target)?;
    let mut centers = ColumnDefinition::new(args.data_column.as_str(), SType::F64);
    centers.units.clone_from(&data_def.units);
    centers.symbol.clone_from(&data_def.symbol);
    output.define_column(centers)?;
    if cdf != Cdf::Only {
        let symbol = match args.normalize {
            None => "NumberOfOccurrences",
            Some(Normalize::Sum) => "FractionalFrequency",
            Some(_) => "NormalizedFrequency",
        };
        output.define_column(ColumnDefinition::new("frequency", SType::F64).with_symbol(symbol))?;
    }
    if cdf != Cdf::Off {
        output.define_column(ColumnDefinition::new(cdf_name.as_str(), SType::F64))?;
    }
    output.define_parameter(
        ParameterDefinition::new("sddshistInput", SType::String).with_fixed_value(input_name),
    )?;
    output.define_parameter(ParameterDefinition::new("sddshistBins", SType::I32))?;
    output.define_parameter(ParameterDefinition::new("sddshistBinSize", SType::F64))?;
    output.define_parameter(ParameterDefinition::new("sddshistBinned", SType::I32))?;
    if let Some(filter) = &args.filter {
        let units = input.layout().column(&filter.column)?.units.clone();
        output.define_parameter(
            ParameterDefinition::new("sddshistFilter", SType::String)
                .with_fixed_value(filter.column.as_str()),
        )?;
        for name in ["sddshistLowerFilter", "sddshistUpperFilter"] {
            let mut def = ParameterDefinition::new(name, SType::F64);
            def.units.clone_from(&units);
            output.define_parameter(def)?;
        }
    }
    if args.statistics {
        for suffix in ["Mean", "Rms", "StDev"] {
            let mut def = ParameterDefinition::new(format!("{}{suffix}", args.data_column), SType::F64);
            def.units.clone_from(&data_def.units);
            output.define_parameter(def)?;
        }
    }
    output.define_parameter(
        ParameterDefinition::new("sddshistNormMode", SType::String)
            .with_fixed_value(args.normalize.map_or("no", Normalize::name)),
    )?;
    let inherited: Vec<String> = input
        .layout()
        .parameter_names()
        .filter(|name| output.layout().parameter_index(name).is_none())
        .map(str::to_string)
        .collect();
    for name in &inherited {
        let def = input.layout().parameter(name)?.clone();
        output.define_parameter(def)?;
    }
    output.write_layout()?;

    while let Some(page) = input.read_page()? {
        let mut data = input.get_column_as_f64(&args.data_column)?;
        if let Some(filter) = &args.filter {
            let keys = input.get_column_as_f64(&filter.column)?;
            data = data
                .into_iter()
                .zip(keys)
                .filter(|(_, key)| (filter.lower..=filter.upper).contains(key))
                .map(|(value, _)| value)
                .collect();
        }
        let (lower, upper) = limits(&data, args.lower_limit, args.upper_limit);
        let mut histogram = Histogram::new(&data, args.bins, lower, upper);
        let cumulative = histogram.cdf();
        if let Some(mode) = args.normalize {
            histogram.normalize(mode);
        }
        debug!(
            "page {page}: {} of {} values binned in {} bins",
            histogram.binned,
            data.len(),
            args.bins
        );

        output.start_page(args.bins)?;
        copy_parameters(&mut output, &input)?;
        output.set_column(&args.data_column, &TypedBuffer::from(histogram.centers()))?;
        if cdf != Cdf::Only {
            output.set_column("frequency", &TypedBuffer::from(histogram.counts.clone()))?;
        }
        if cdf != Cdf::Off {
            output.set_column(&cdf_name, &TypedBuffer::from(cumulative))?;
        }
        output.set_parameter("sddshistBins", i32::try_from(args.bins).unwrap_or(i32::MAX))?;
        output.set_parameter("sddshistBinSize", histogram.width)?;
        output.set_parameter(
            "sddshistBinned",
            i32::try_from(histogram.binned).unwrap_or(i32::MAX),
        )?;
        if let Some(filter) = &args.filter {
            output.set_parameter("sddshistLowerFilter", filter.lower)?;
            output.set_parameter("sddshistUpperFilter", filter.upper)?;
        }
        if args.statistics && !data.is_empty() {
            let (mean, rms, stdev) = moments(&data);
            output.set_parameter(&format!("{}Mean", args.data_column), mean)?;
            output.set_parameter(&format!("{}Rms", args.data_column), rms)?;
            output.set_parameter(&format!("{}StDev", args.data_column), stdev)?;
        }
        output.write_page()?;
    }

    input.terminate()?;
    output.terminate()?;
    files.output.finish()
}

#[cfg(test)]
mod tests {
    use sdds::SddsWriteOptions;

    use super::*;

    #[test]
    fn bins_every_value_inside_the_range() {
        let histogram = Histogram::new(&[0.0, 0.1, 0.5, 1.0, 1.5], 2, 0.0, 1.0);
        assert_eq!(histogram.counts, vec![2.0, 2.0]);
        assert_eq!(histogram.binned, 4);
        assert_eq!(histogram.centers(), vec![0.25, 0.75]);
        assert_eq!(histogram.cdf(), vec![0.5, 1.0]);
    }

    #[test]
    fn normalizes() {
        let mut histogram = Histogram::new(&[0.1, 0.2, 0.7], 2, 0.0, 1.0);
        histogram.normalize(Normalize::Peak);
        assert_eq!(histogram.counts, vec![1.0, 0.5]);
        histogram.normalize(Normalize::Sum);
        assert!((histogram.counts[0] - 2.0 / 3.0).abs() < 1e-12);
        histogram.normalize(Normalize::Area);
        assert!((histogram.counts.iter().sum::<f64>() * histogram.width - 1.0).abs() < 1e-12);
    }

    #[test]
    fn degenerate_limits_are_widened() {
        let (lo, hi) = limits(&[2.0, 2.0], None, None);
        assert!(lo < 2.0 && hi > 2.0);
        let (lo, hi) = limits(&[], None, None);
        assert!(lo < 0.0 && hi > 0.0);
        assert_eq!(limits(&[5.0], Some(0.0), Some(10.0)), (0.0, 10.0));
    }

    #[test]
    fn histograms_a_page_with_cdf() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.sdds");
        let output = dir.path().join("hist.sdds");

        let mut out = SddsWriteOptions::new().create(&input).unwrap();
        out.define_column(ColumnDefinition::new("x", SType::F64))
            .unwrap();
        out.define_column(ColumnDefinition::new("keep", SType::I16))
            .unwrap();
        out.write_layout().unwrap();
        out.start_page(1000).unwrap();
        let x: Vec<f64> = (0..1000i32).map(|i| f64::from(i) / 999.0).collect();
        let keep: Vec<i16> = (0..1000i32).map(|i| i16::from(i % 4 != 0)).collect();
        out.set_column("x", &TypedBuffer::from(x)).unwrap();
        out.set_column("keep", &TypedBuffer::from(keep)).unwrap();
        out.write_page().unwrap();
        out.terminate().unwrap();

        let args = HistArgs {
            input: Some(input),
            output: Some(output.clone()),
            data_column: "x".to_string(),
            bins: 10,
            lower_limit: None,
            upper_limit: None,
            filter: Some("keep,1,1".parse().unwrap()),
            cdf: Some(Cdf::With),
            normalize: None,
            statistics: true,
            common: CommonArgs::default(),
        };
        exec_hist(args, EngineConfig::default()).unwrap();

        let mut hist = SddsOpenOptions::new().open(&output).unwrap();
        hist.read_page().unwrap().unwrap();
        assert_eq!(hist.row_count(), 10);
        let frequency = hist.get_column_as_f64("frequency").unwrap();
        assert_eq!(frequency.iter().sum::<f64>(), 750.0);
        let cdf = hist.get_column_as_f64("xCdf").unwrap();
        assert!(cdf[0] >= 0.0);
        assert!(cdf.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!((cdf[9] - 1.0).abs() < 1e-12);
        assert_eq!(hist.get_parameter_as_f64("sddshistBinned").unwrap(), 750.0);
        assert!(hist.get_parameter_as_f64("xMean").unwrap() > 0.0);
        assert_eq!(
            hist.get_parameter("sddshistNormMode").unwrap().as_str(),
            Some("no")
        );
    }
}
