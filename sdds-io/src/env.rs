use std::env;

use log::debug;
use sdds_error::{SddsResult, sdds_err};

use crate::ByteOrder;

/// Environment variable that overrides the byte order of binary output.
pub const OUTPUT_ENDIANESS_VAR: &str = "SDDS_OUTPUT_ENDIANESS";

/// Process-level settings captured once when a tool starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Byte order forced onto every binary output, if any.
    pub output_byte_order: Option<ByteOrder>,
}

impl EngineConfig {
    /// Capture `SDDS_OUTPUT_ENDIANESS` and remove it so child processes do not inherit it.
    pub fn from_env() -> SddsResult<Self> {
        let value = env::var(OUTPUT_ENDIANESS_VAR).ok();
        if value.is_some() {
            // SAFETY: tools call this once at startup, before spawning any threads.
            unsafe { env::remove_var(OUTPUT_ENDIANESS_VAR) };
        }
        Self::from_value(value.as_deref())
    }

    /// Interpret a raw `SDDS_OUTPUT_ENDIANESS` value.
    pub fn from_value(value: Option<&str>) -> SddsResult<Self> {
        let output_byte_order = value
            .map(|v| {
                ByteOrder::parse(v).ok_or_else(|| {
                    sdds_err!(Usage: "{} must be big or little, not {:?}", OUTPUT_ENDIANESS_VAR, v)
                })
            })
            .transpose()?;
        if let Some(order) = output_byte_order {
            debug!("binary output forced to {order}");
        }
        Ok(Self { output_byte_order })
    }
}
