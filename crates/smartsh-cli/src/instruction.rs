//! `--agent` mode instruction resolution: the instruction comes from
//! trailing args if given, else standard input; either a bare string or a
//! JSON object carrying a declared `instruction` key.

use std::io::Read;

use smartsh_core::{Error, Result};

#[derive(serde::Deserialize)]
struct InstructionObject {
    instruction: String,
}

/// Resolves the agent instruction text from `args` (already joined, if
/// non-empty) or by reading all of `stdin` otherwise. Taking the reader as
/// a parameter (rather than reaching for `std::io::stdin()` internally)
/// keeps this testable without depending on the test process's real stdin.
pub fn resolve(args: &[String], mut stdin: impl Read) -> Result<String> {
    let raw = if args.is_empty() {
        let mut buf = String::new();
        stdin.read_to_string(&mut buf).map_err(Error::from)?;
        buf
    } else {
        args.join(" ")
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::message("no agent instruction given (args or stdin)"));
    }

    if trimmed.starts_with('{') {
        let parsed: InstructionObject = serde_json::from_str(trimmed).map_err(Error::from)?;
        return Ok(parsed.instruction);
    }

    Ok(trimmed.to_string())
}
