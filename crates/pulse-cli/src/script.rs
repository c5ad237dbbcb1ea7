use anyhow::{bail, Context, Result};
use std::str::FromStr;

/// One entry of a `simulate --script` sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptStep {
    /// Advance simulated time (ms).
    Wait(u64),
    /// Rotary push.
    Push,
    /// SW0.
    Sw,
    /// Clockwise detent.
    Cw,
    /// Counter-clockwise detent.
    Ccw,
}

impl FromStr for ScriptStep {
    type Err = anyhow::Error;

    fn from_str(token: &str) -> Result<Self> {
        let token = token.trim();
        if let Some(ms) = token.strip_prefix("wait:") {
            let ms = ms
                .parse()
                .with_context(|| format!("wait needs milliseconds: {token}"))?;
            return Ok(ScriptStep::Wait(ms));
        }
        Ok(match token.to_ascii_lowercase().as_str() {
            "push" => ScriptStep::Push,
            "sw" => ScriptStep::Sw,
            "cw" => ScriptStep::Cw,
            "ccw" => ScriptStep::Ccw,
            _ => bail!("unknown script step {token:?}"),
        })
    }
}

/// Splits on commas and whitespace.
pub fn parse_script(text: &str) -> Result<Vec<ScriptStep>> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_separators() {
        let steps = parse_script("wait:2500, cw cw\nPUSH,wait:100 ccw sw").unwrap();
        assert_eq!(
            steps,
            vec![
                ScriptStep::Wait(2500),
                ScriptStep::Cw,
                ScriptStep::Cw,
                ScriptStep::Push,
                ScriptStep::Wait(100),
                ScriptStep::Ccw,
                ScriptStep::Sw,
            ]
        );
        assert!(parse_script("").unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_steps() {
        assert!(parse_script("wait:soon").is_err());
        assert!(parse_script("push jump").is_err());
    }
}
