use std::path::PathBuf;
use std::str::FromStr;

use log::{debug, warn};
use sdds::dtype::{SType, TypedBuffer, Value};
use sdds::error::{SddsResult, sdds_bail};
use sdds::io::EngineConfig;
use sdds::{
    Dataset, InputTarget, KeyHash, RowRange, SddsOpenOptions, SortedKeyGroups, copy_arrays,
    copy_columns, copy_page, copy_parameters, transfer_array_definition,
    transfer_parameter_definition,
};

use crate::files::{CommonArgs, Files};

/// A key column of the first input and the column of the second input it is compared with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumns {
    pub left: String,
    pub right: String,
}

impl FromStr for KeyColumns {
    type Err = String;

    /// `name` or `name=otherName`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (left, right) = s.split_once('=').unwrap_or((s, s));
        if left.is_empty() || right.is_empty() {
            return Err(format!("invalid key column specification {s}"));
        }
        Ok(Self {
            left: left.to_string(),
            right: right.to_string(),
        })
    }
}

/// What may be matched more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reuse {
    /// A row of the second input may match several rows of the first.
    pub rows: bool,
    /// The first page of the second input serves every page of the first.
    pub page: bool,
}

impl FromStr for Reuse {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self {
                rows: true,
                page: false,
            });
        }
        let mut reuse = Self::default();
        for word in s.split(',').map(str::trim) {
            match word.to_ascii_lowercase().as_str() {
                "rows" | "row" => reuse.rows = true,
                "page" => reuse.page = true,
                other => return Err(format!("unknown reuse keyword {other}")),
            }
        }
        Ok(reuse)
    }
}

#[derive(Debug, Clone, clap::Args)]
#[command(group = clap::ArgGroup::new("key").required(true).args(["match_column", "equate_column"]))]
pub struct SelectArgs {
    /// `[<input1>] <input2> [<output>]`
    #[arg(num_args = 1..=3, required = true)]
    pub files: Vec<PathBuf>,

    /// Keep rows whose string key appears in the second input.
    #[arg(long = "match", value_name = "column[=column2]", value_parser = KeyColumns::from_str)]
    pub match_column: Option<KeyColumns>,

    /// Keep rows whose numeric key appears in the second input.
    #[arg(long = "equate", value_name = "column[=column2]", value_parser = KeyColumns::from_str)]
    pub equate_column: Option<KeyColumns>,

    /// Keep the rows that have no match instead.
    #[arg(long)]
    pub invert: bool,

    #[arg(
        long,
        value_name = "rows,page",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "",
        value_parser = Reuse::from_str
    )]
    pub reuse: Option<Reuse>,

    /// Look keys up in a hash table rather than sorted groups.
    #[arg(long)]
    pub hash_lookup: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

enum Lookup {
    Sorted(SortedKeyGroups),
    Hashed(KeyHash),
}

impl Lookup {
    fn new(keys: &TypedBuffer, hashed: bool) -> SddsResult<Self> {
        Ok(if hashed {
            Lookup::Hashed(KeyHash::new(keys)?)
        } else {
            Lookup::Sorted(SortedKeyGroups::new(keys)?)
        })
    }

    fn find(&mut self, sought: &Value, reuse: bool) -> bool {
        match self {
            Lookup::Sorted(groups) => groups.find_matching(sought, reuse).is_some(),
            Lookup::Hashed(hash) => hash.find_matching(sought, reuse).is_some(),
        }
    }
}

/// Keep the rows of the first input whose key does, or does not, appear in the second.
pub fn exec_select(args: SelectArgs, config: EngineConfig) -> SddsResult<()> {
    let piped_input = args.common.pipe.is_some_and(|p| p.input);
    let mut names = args.files.iter().cloned();
    let input1 = if piped_input { None } else { names.next() };
    let Some(input2) = names.next() else {
        sdds_bail!(Usage: "a second input file is required");
    };
    let output = names.next();
    if names.next().is_some() {
        sdds_bail!(Usage: "too many file names");
    }
    let files = Files::resolve(input1, output, &args.common)?;
    let reuse = args.reuse.unwrap_or_default();

    let mut input1 = SddsOpenOptions::new().open_target(&files.input)?;
    let mut input2 = SddsOpenOptions::new().open_target(&InputTarget::File(input2))?;
    let (keys, numeric) = match (&args.match_column, &args.equate_column) {
        (Some(keys), _) => (keys, false),
        (None, Some(keys)) => (keys, true),
        (None, None) => sdds_bail!(Usage: "either --match or --equate is required"),
    };
    input1.layout().require_column(&keys.left)?;
    input2.layout().require_column(&keys.right)?;

    let mut output = args
        .common
        .write_options(config)
        .with_layout(input1.layout())
        .create_target(&files.output.target)?;
    let extra_parameters: Vec<String> = input2
        .layout()
        .parameter_names()
        .filter(|name| input1.layout().parameter_index(name).is_none())
        .map(str::to_string)
        .collect();
    for name in &extra_parameters {
        transfer_parameter_definition(&mut output, &input2, name, None)?;
    }
    let extra_arrays: Vec<String> = input2
        .layout()
        .array_names()
        .filter(|name| input1.layout().array_index(name).is_none())
        .map(str::to_string)
        .collect();
    for name in &extra_arrays {
        transfer_array_definition(&mut output, &input2, name, None)?;
    }
    output.write_layout()?;

    let mut have_second = false;
    while let Some(page) = input1.read_page()? {
        if !reuse.page || !have_second {
            if input2.read_page()?.is_none() {
                if reuse.page {
                    sdds_bail!(Usage: "the second input has no data");
                }
                warn!("the second input ends before the first, at page {page}");
                if !args.invert {
                    break;
                }
                copy_page(&mut output, &input1)?;
                output.write_page()?;
                continue;
            }
            have_second = true;
        }

        let matched = match_rows(&input1, &input2, keys, numeric, reuse.rows, args.hash_lookup)?;
        output.start_page(input1.row_count())?;
        copy_parameters(&mut output, &input2)?;
        copy_arrays(&mut output, &input2)?;
        copy_parameters(&mut output, &input1)?;
        copy_arrays(&mut output, &input1)?;
        copy_columns(&mut output, &input1)?;
        let rejected: Vec<usize> = matched
            .iter()
            .enumerate()
            .filter(|(_, matched)| **matched == args.invert)
            .map(|(row, _)| row)
            .collect();
        output.assert_row_flags(RowRange::Indices(&rejected), false)?;
        let removed = output.delete_unset_rows()?;
        debug!("page {page}: dropped {removed} of {} rows", matched.len());
        output.write_page()?;
    }

    input1.terminate()?;
    input2.terminate()?;
    output.terminate()?;
    files.output.finish()
}

fn match_rows(
    input1: &Dataset,
    input2: &Dataset,
    keys: &KeyColumns,
    numeric: bool,
    reuse: bool,
    hashed: bool,
) -> SddsResult<Vec<bool>> {
    let (sought, candidates) = if numeric {
        (
            TypedBuffer::from(input1.get_column_as_f64(&keys.left)?),
            TypedBuffer::from(input2.get_column_as_f64(&keys.right)?),
        )
    } else {
        (
            string_column(input1, &keys.left)?,
            string_column(input2, &keys.right)?,
        )
    };
    if candidates.is_empty() {
        return Ok(vec![false; sought.len()]);
    }
    let mut lookup = Lookup::new(&candidates, hashed)?;
    Ok(sought.iter().map(|value| lookup.find(&value, reuse)).collect())
}

fn string_column(dataset: &Dataset, name: &str) -> SddsResult<TypedBuffer> {
    let column = dataset.get_column(name)?;
    if column.stype() != SType::String {
        sdds_bail!(TypeMismatch: "column {} is not a string column", name);
    }
    Ok(column)
}
