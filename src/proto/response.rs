//! Parsers for the instrument's line oriented replies.
//!
//! All functions work on the reply body, i.e. with the trailing
//! `\r\nch> ` removed (see [`strip_prompt`]).

use std::str;

use super::codec::PROMPT;
use super::{ProtoError, Result};
use crate::measurement::{ComplexSample, FrequencySweep};

/// Decodes a raw reply and removes the trailing prompt and line breaks.
pub fn strip_prompt(raw: &[u8]) -> Result<&str> {
    let body = raw.strip_suffix(PROMPT).unwrap_or(raw);
    let text = str::from_utf8(body)
        .map_err(|e| ProtoError::parse(String::from_utf8_lossy(raw), e))?;
    Ok(text.trim_matches(|c| c == '\r' || c == '\n'))
}

fn lines(body: &str) -> impl Iterator<Item = &str> {
    body.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// One frequency in Hz per line, order preserved.
pub fn parse_frequencies(body: &str) -> Result<FrequencySweep> {
    lines(body)
        .map(|line| line.parse::<f64>().map_err(|e| ProtoError::parse(line, e)))
        .collect()
}

/// Parses a single sample line.
///
/// Two shapes are accepted:
/// - `"<real> <imag>"`, two plain floats separated by whitespace,
/// - a complex literal such as `"2.5-1.3j"` as produced by [`compact_form`].
pub fn parse_complex_line(line: &str) -> Result<ComplexSample> {
    let line = line.trim();
    if line.ends_with(is_imaginary_unit) || line.starts_with('(') {
        return parse_complex_literal(line);
    }

    let values: Vec<&str> = line.split_whitespace().collect();
    if values.len() != 2 {
        return Err(ProtoError::parse(line, "expected <real> <imag>"));
    }
    let re = values[0]
        .parse::<f64>()
        .map_err(|e| ProtoError::parse(line, e))?;
    let im = values[1]
        .parse::<f64>()
        .map_err(|e| ProtoError::parse(line, e))?;
    Ok(ComplexSample::new(re, im))
}

fn is_imaginary_unit(c: char) -> bool {
    c == 'j' || c == 'J'
}

fn parse_complex_literal(input: &str) -> Result<ComplexSample> {
    let literal = input
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')');

    let Some(body) = literal.strip_suffix(is_imaginary_unit) else {
        let re = literal
            .parse::<f64>()
            .map_err(|e| ProtoError::parse(input, e))?;
        return Ok(ComplexSample::new(re, 0.0));
    };

    // Sign that separates real and imaginary part, skipping exponent signs
    let bytes = body.as_bytes();
    let split = (1..bytes.len())
        .rev()
        .find(|&i| matches!(bytes[i], b'+' | b'-') && !matches!(bytes[i - 1], b'e' | b'E'));

    let (re, im) = match split {
        Some(i) => (&body[..i], &body[i..]),
        None => ("0", body),
    };
    let re = re.parse::<f64>().map_err(|e| ProtoError::parse(input, e))?;
    let im = match im {
        "" | "+" => 1.0,
        "-" => -1.0,
        im => im.parse::<f64>().map_err(|e| ProtoError::parse(input, e))?,
    };
    Ok(ComplexSample::new(re, im))
}

/// One sample per line, in either accepted shape.
pub fn parse_samples(body: &str) -> Result<Vec<ComplexSample>> {
    lines(body).map(parse_complex_line).collect()
}

/// Rewrites a `"<real> <imag>\r\n"` stream into complex literals, one per
/// line: `\r` becomes the imaginary unit `j`, the separating space becomes
/// `+` and a resulting `+-` collapses to `-`.
pub fn compact_form(raw: &str) -> String {
    raw.replace('\r', "j").replace(' ', "+").replace("+-", "-")
}

/// Element-wise mean of the first `n` sample sets.
///
/// Real and imaginary parts are averaged independently. All sets must have
/// the same length.
pub fn average(sets: &[Vec<ComplexSample>], n: usize) -> Result<Vec<ComplexSample>> {
    if n == 0 || sets.len() < n {
        return Err(ProtoError::EmptyAverage);
    }
    let sets = &sets[..n];
    let len = sets[0].len();
    if let Some(odd) = sets.iter().find(|set| set.len() != len) {
        return Err(ProtoError::LengthMismatch {
            expected: len,
            found: odd.len(),
        });
    }

    let mut sum = vec![ComplexSample::default(); len];
    for set in sets {
        for (acc, s) in sum.iter_mut().zip(set) {
            acc.re += s.re;
            acc.im += s.im;
        }
    }
    let n = n as f64;
    Ok(sum
        .into_iter()
        .map(|s| ComplexSample::new(s.re / n, s.im / n))
        .collect())
}
