//! The duration literal grammar: `\d+[a-zA-Z]+` with each unit
//! appearing at most once, e.g. `1w3d8h`. Internally a duration is a plain
//! `f64` number of seconds, which keeps sub-second units (`ns`, `us`/`μs`,
//! `ms`) exact enough for the engine's purposes without pulling in a
//! fixed-point duration type.

use crate::err::Error;

const NS: f64 = 1e-9;
const US: f64 = 1e-6;
const MS: f64 = 1e-3;
const SEC: f64 = 1.0;
const MIN: f64 = 60.0;
const HOUR: f64 = 3600.0;
const DAY: f64 = 86_400.0;
const WEEK: f64 = 604_800.0;

/// Unit table in longest-suffix-first match order so `ms` is tried before
/// `m`, and `us`/`μs` before a bare unit starting with the same byte.
const UNITS: &[(&str, f64)] =
	&[("ns", NS), ("us", US), ("μs", US), ("ms", MS), ("s", SEC), ("m", MIN), ("h", HOUR), ("d", DAY), ("w", WEEK)];

/// Parses a duration literal such as `1w3d8h` into seconds.
///
/// Each unit may appear at most once; units may be given in any order
/// (`format` always re-emits them largest-first for a canonical form, so
/// `format(parse(d))` is not `d` verbatim, but `format(parse(format(parse(d))))
/// == format(parse(d))`, i.e. it's a normal form, not a round-trip of the
/// original text).
pub fn parse_duration(input: &str) -> Result<f64, Error> {
	let mut rest = input;
	let mut total = 0.0;
	let mut seen = [false; UNITS.len()];
	if rest.is_empty() {
		return Err(Error::SyntaxError("empty duration".into()));
	}
	while !rest.is_empty() {
		let digits_len = rest.bytes().take_while(|b| b.is_ascii_digit()).count();
		if digits_len == 0 {
			return Err(Error::SyntaxError(format!("expected digits in duration {input:?}")));
		}
		let value: u64 = rest[..digits_len]
			.parse()
			.map_err(|_| Error::SyntaxError(format!("duration value overflow in {input:?}")))?;
		rest = &rest[digits_len..];

		let (unit_idx, unit_len, scale) = UNITS
			.iter()
			.enumerate()
			.find_map(|(i, (suffix, scale))| rest.starts_with(suffix).then_some((i, suffix.len(), *scale)))
			.ok_or_else(|| Error::SyntaxError(format!("unknown duration suffix in {input:?}")))?;
		if seen[unit_idx] {
			return Err(Error::SyntaxError(format!("duplicate duration unit in {input:?}")));
		}
		seen[unit_idx] = true;
		rest = &rest[unit_len..];
		total += value as f64 * scale;
	}
	Ok(total)
}

/// Renders a number of seconds back into canonical duration syntax, largest
/// unit first, omitting zero components (`0` seconds renders as `0s`).
pub fn format_duration(mut seconds: f64) -> String {
	if seconds == 0.0 {
		return "0s".to_string();
	}
	let mut out = String::new();
	// Largest-to-smallest, skipping the sub-second units which only apply
	// when the whole value is representable as a single fractional unit.
	for (suffix, scale) in [("w", WEEK), ("d", DAY), ("h", HOUR), ("m", MIN), ("s", SEC)] {
		let count = (seconds / scale).trunc();
		if count >= 1.0 {
			out.push_str(&format!("{}{}", count as u64, suffix));
			seconds -= count * scale;
		}
	}
	if out.is_empty() {
		for (suffix, scale) in [("ms", MS), ("us", US), ("ns", NS)] {
			let count = (seconds / scale).round();
			if count >= 1.0 {
				out.push_str(&format!("{}{}", count as u64, suffix));
				break;
			}
		}
	}
	if out.is_empty() {
		out.push_str("0s");
	}
	out
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn parses_combined_units() {
		let secs = parse_duration("1w3d8h").unwrap();
		assert_eq!(secs, WEEK + 3.0 * DAY + 8.0 * HOUR);
	}

	#[test]
	fn rejects_duplicate_unit() {
		assert!(parse_duration("1h2h").is_err());
	}

	#[test]
	fn rejects_unknown_suffix() {
		assert!(parse_duration("5x").is_err());
	}

	#[test]
	fn format_round_trip_is_stable() {
		let d = parse_duration("2d5h").unwrap();
		let formatted = format_duration(d);
		assert_eq!(formatted, "2d5h");
		let reparsed = parse_duration(&formatted).unwrap();
		assert_eq!(format_duration(reparsed), formatted);
	}

	#[test]
	fn sub_second_units() {
		assert_eq!(parse_duration("500ms").unwrap(), 0.5);
		assert_eq!(parse_duration("10us").unwrap(), 10.0 * US);
		assert_eq!(parse_duration("10ns").unwrap(), 10.0 * NS);
	}
}
