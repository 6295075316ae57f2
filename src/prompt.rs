//! Interactive input size selection.
//!
//! The menu offers two presets and a custom size. Anything the user types is
//! corrected in place: bad input falls back to the default size with a
//! warning instead of aborting startup.

use anyhow::{Context, Result};
use std::io::{BufRead, Write};

use crate::input_size::{InputSize, SizeWarning};

pub const PRESET_SMALL: u32 = 640;
pub const PRESET_LARGE: u32 = 1280;

/// Outcome of size selection: the size to use and any corrections applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SizeSelection {
    pub size: InputSize,
    pub warnings: Vec<SizeWarning>,
}

impl SizeSelection {
    fn preset(size: u32) -> Self {
        Self {
            size: InputSize::new(size).unwrap_or_default(),
            warnings: Vec::new(),
        }
    }

    fn fallback(warning: SizeWarning) -> Self {
        Self {
            size: InputSize::default(),
            warnings: vec![warning],
        }
    }
}

/// Menu choice as typed by the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeChoice {
    Small,
    Large,
    Custom,
}

impl SizeChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(Self::Small),
            "2" => Some(Self::Large),
            "3" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Resolves a menu choice and, for [`SizeChoice::Custom`], the custom size text.
///
/// `custom` is only consulted for choice `3`; `None` there means the user gave
/// no custom input at all and is treated like unparseable input.
pub fn resolve_size_choice(choice: &str, custom: Option<&str>) -> SizeSelection {
    match SizeChoice::parse(choice) {
        Some(SizeChoice::Small) => SizeSelection::preset(PRESET_SMALL),
        Some(SizeChoice::Large) => SizeSelection::preset(PRESET_LARGE),
        Some(SizeChoice::Custom) => resolve_custom_size(custom.unwrap_or("")),
        None => SizeSelection::fallback(SizeWarning::InvalidChoice {
            input: choice.trim().to_string(),
        }),
    }
}

fn resolve_custom_size(input: &str) -> SizeSelection {
    let requested: i64 = match input.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            return SizeSelection::fallback(SizeWarning::Unparseable {
                input: input.trim().to_string(),
            })
        }
    };
    match InputSize::normalize(requested) {
        Ok((size, warning)) => SizeSelection {
            size,
            warnings: warning.into_iter().collect(),
        },
        Err(_) => SizeSelection::fallback(SizeWarning::Rejected { requested }),
    }
}

/// Prints the size menu to `output` and reads the answer(s) from `input`.
///
/// Warnings are echoed to `output` and logged. End of input counts as an
/// invalid choice.
pub fn choose_input_size<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<SizeSelection> {
    writeln!(output, "Choose input image size:")?;
    writeln!(output, "1. {PRESET_SMALL}x{PRESET_SMALL}")?;
    writeln!(output, "2. {PRESET_LARGE}x{PRESET_LARGE}")?;
    writeln!(output, "3. Custom")?;
    write!(output, "Enter your choice (1/2/3): ")?;
    output.flush()?;

    let choice = read_line(input).context("read size choice")?;
    let custom = if SizeChoice::parse(&choice) == Some(SizeChoice::Custom) {
        write!(
            output,
            "Enter input image size (must be a multiple of 32, e.g., {PRESET_SMALL} or {PRESET_LARGE}): "
        )?;
        output.flush()?;
        Some(read_line(input).context("read custom size")?)
    } else {
        None
    };

    let selection = resolve_size_choice(&choice, custom.as_deref());
    for warning in &selection.warnings {
        log::warn!("{}", warning);
        writeln!(output, "{}", warning)?;
    }
    writeln!(output, "Using input image size: {}", selection.size)?;
    Ok(selection)
}

fn read_line<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn presets_select_fixed_sizes() {
        assert_eq!(resolve_size_choice("1", None).size.get(), 640);
        assert_eq!(resolve_size_choice(" 2 \n", None).size.get(), 1280);
        assert!(resolve_size_choice("1", None).warnings.is_empty());
    }

    #[test]
    fn custom_size_is_aligned_with_warning() {
        let selection = resolve_size_choice("3", Some("700"));
        assert_eq!(selection.size.get(), 672);
        assert_eq!(
            selection.warnings,
            vec![SizeWarning::Adjusted {
                requested: 700,
                adjusted: 672
            }]
        );

        let selection = resolve_size_choice("3", Some("960"));
        assert_eq!(selection.size.get(), 960);
        assert!(selection.warnings.is_empty());
    }

    #[test]
    fn bad_custom_input_falls_back_to_default() {
        let selection = resolve_size_choice("3", Some("big"));
        assert_eq!(selection.size.get(), 640);
        assert!(matches!(
            selection.warnings.as_slice(),
            [SizeWarning::Unparseable { .. }]
        ));

        let selection = resolve_size_choice("3", Some("1"));
        assert_eq!(selection.size.get(), 640);
        assert_eq!(
            selection.warnings,
            vec![SizeWarning::Rejected { requested: 1 }]
        );

        let selection = resolve_size_choice("3", None);
        assert_eq!(selection.size.get(), 640);
    }

    #[test]
    fn unknown_choice_falls_back_to_default() {
        let selection = resolve_size_choice("7", None);
        assert_eq!(selection.size.get(), 640);
        assert_eq!(
            selection.warnings,
            vec![SizeWarning::InvalidChoice {
                input: "7".to_string()
            }]
        );
    }

    #[test]
    fn prompt_reads_custom_size_from_second_line() -> Result<()> {
        let mut input = Cursor::new("3\n1000\n");
        let mut output = Vec::new();
        let selection = choose_input_size(&mut input, &mut output)?;
        assert_eq!(selection.size.get(), 992);

        let printed = String::from_utf8(output)?;
        assert!(printed.contains("1. 640x640"));
        assert!(printed.contains("3. Custom"));
        assert!(printed.contains("adjusted 1000 to 992x992"));
        assert!(printed.ends_with("Using input image size: 992x992\n"));
        Ok(())
    }

    #[test]
    fn prompt_treats_end_of_input_as_invalid_choice() -> Result<()> {
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        let selection = choose_input_size(&mut input, &mut output)?;
        assert_eq!(selection.size.get(), 640);
        assert_eq!(selection.warnings.len(), 1);
        Ok(())
    }
}
