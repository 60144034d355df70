//! Rule-based input perturbation
//!
//! A rule selects lines of a simulator input file and rewrites the numbers
//! on them. The input side is described by a scanf-like `format` whose
//! whitespace-separated tokens are `%f` (float), `%d` (integer) or literal
//! text. The output side is a printf-like `outformat` with one token per
//! input token. Each rewritten line is the output tokens joined, each
//! preceded by a single space.
//!
//! For a perturbation `p` and a scaling of `transperc` percent, a float `v`
//! becomes `v + transperc * 0.01 * v * p`; an integer gains the truncated
//! value of the same increment.

use crate::config::RuleConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Token of an input `format`
#[derive(Debug, Clone, PartialEq)]
pub enum FormatToken {
    Float,
    Int,
    Literal(String),
    /// A `%` conversion other than `%f` / `%d`
    Unsupported(String),
}

impl FormatToken {
    pub fn parse(token: &str) -> Self {
        if token.starts_with("%f") {
            FormatToken::Float
        } else if token.starts_with("%d") {
            FormatToken::Int
        } else if token.starts_with('%') && token.len() > 1 && !token.starts_with("%%") {
            FormatToken::Unsupported(token.to_string())
        } else {
            FormatToken::Literal(token.to_string())
        }
    }
}

/// Number of whitespace-separated tokens in a format string
pub fn count_tokens(format: &str) -> usize {
    format.split_whitespace().count()
}

/// Value scanned from an input line
#[derive(Debug, Clone, Copy, PartialEq)]
enum Scanned {
    Float(f64),
    Int(i64),
    Literal,
}

/// printf conversion: `%[-+0][width][.precision](f|e|d|i)`
#[derive(Debug, Clone, PartialEq)]
struct Conversion {
    left: bool,
    plus: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    kind: char,
}

impl Conversion {
    fn parse(token: &str) -> Option<Self> {
        let mut chars = token.strip_prefix('%')?.chars().peekable();
        let mut conv = Conversion {
            left: false,
            plus: false,
            zero: false,
            width: 0,
            precision: None,
            kind: 'f',
        };

        while let Some(&c) = chars.peek() {
            match c {
                '-' => conv.left = true,
                '+' => conv.plus = true,
                '0' => conv.zero = true,
                _ => break,
            }
            chars.next();
        }

        let mut width = String::new();
        while let Some(&c) = chars.peek().filter(|c| c.is_ascii_digit()) {
            width.push(c);
            chars.next();
        }
        conv.width = if width.is_empty() { 0 } else { width.parse().ok()? };

        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = String::new();
            while let Some(&c) = chars.peek().filter(|c| c.is_ascii_digit()) {
                precision.push(c);
                chars.next();
            }
            conv.precision = Some(if precision.is_empty() { 0 } else { precision.parse().ok()? });
        }

        // Length modifiers are accepted and ignored
        while chars.peek().map_or(false, |c| *c == 'l' || *c == 'h') {
            chars.next();
        }

        conv.kind = match chars.next()? {
            c @ ('f' | 'F' | 'e' | 'E' | 'd' | 'i') => c,
            _ => return None,
        };
        Some(conv)
    }

    fn render(&self, value: Scanned) -> String {
        let body = match (self.kind, value) {
            ('d' | 'i', Scanned::Float(v)) => self.signed(v.trunc() as i64 >= 0, (v.trunc() as i64).to_string()),
            ('d' | 'i', Scanned::Int(v)) => self.signed(v >= 0, v.to_string()),
            (kind, Scanned::Float(v)) => self.float(kind, v),
            (kind, Scanned::Int(v)) => self.float(kind, v as f64),
            (_, Scanned::Literal) => String::new(),
        };
        self.pad(body)
    }

    fn float(&self, kind: char, v: f64) -> String {
        let precision = self.precision.unwrap_or(6);
        let text = match kind {
            'e' | 'E' => {
                let text = c_exponent(&format!("{:.*e}", precision, v));
                if kind == 'E' {
                    text.to_uppercase()
                } else {
                    text
                }
            }
            _ => format!("{:.*}", precision, v),
        };
        self.signed(!text.starts_with('-'), text)
    }

    fn signed(&self, non_negative: bool, text: String) -> String {
        if self.plus && non_negative {
            format!("+{}", text)
        } else {
            text
        }
    }

    fn pad(&self, body: String) -> String {
        let len = body.chars().count();
        if len >= self.width {
            return body;
        }
        let fill = self.width - len;
        if self.left {
            format!("{}{}", body, " ".repeat(fill))
        } else if self.zero {
            let (sign, digits) = match body.chars().next() {
                Some(c @ ('-' | '+')) => (c.to_string(), &body[1..]),
                _ => (String::new(), body.as_str()),
            };
            format!("{}{}{}", sign, "0".repeat(fill), digits)
        } else {
            format!("{}{}", " ".repeat(fill), body)
        }
    }
}

/// `1.5e2` -> `1.5e+02`
fn c_exponent(text: &str) -> String {
    match text.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => text.to_string(),
    }
}

fn render_output(token: &str, value: Scanned) -> String {
    match (Conversion::parse(token), value) {
        (Some(conv), Scanned::Float(_) | Scanned::Int(_)) => conv.render(value),
        _ => token.replace("%%", "%"),
    }
}

fn parse_float(token: &str) -> Option<f64> {
    token
        .parse::<f64>()
        .ok()
        .or_else(|| token.replace(['D', 'd'], "E").parse::<f64>().ok())
}

/// Rewrite one line according to `rule`
pub fn apply_rule_line(rule: &RuleConfig, line: &str, perturbation: f64) -> Result<String> {
    let scale = rule.transperc * 0.01 * perturbation;
    let mut words = line.split_whitespace().peekable();
    let mut scanned = Vec::new();

    for token in rule.format.split_whitespace() {
        match FormatToken::parse(token) {
            FormatToken::Float => {
                let word = words.next().context("line has fewer values than the format")?;
                let v = parse_float(word).with_context(|| format!("'{}' is not a float", word))?;
                scanned.push(Scanned::Float(v + scale * v));
            }
            FormatToken::Int => {
                let word = words.next().context("line has fewer values than the format")?;
                let v: i64 = word
                    .parse()
                    .with_context(|| format!("'{}' is not an integer", word))?;
                scanned.push(Scanned::Int(v + (scale * v as f64).trunc() as i64));
            }
            FormatToken::Literal(text) => {
                if words.peek() == Some(&text.as_str()) {
                    words.next();
                }
                scanned.push(Scanned::Literal);
            }
            FormatToken::Unsupported(conversion) => anyhow::bail!("unsupported conversion {}", conversion),
        }
    }

    let outputs: Vec<&str> = rule.outformat.split_whitespace().collect();
    if outputs.len() < scanned.len() {
        anyhow::bail!(
            "outformat has {} token(s) but format has {}",
            outputs.len(),
            scanned.len()
        );
    }

    let mut rewritten = String::new();
    for (token, value) in outputs.iter().zip(scanned) {
        rewritten.push(' ');
        rewritten.push_str(&render_output(token, value));
    }
    Ok(rewritten)
}

fn rule_matches(rule: &RuleConfig, line_no: usize) -> bool {
    line_no >= rule.start && line_no <= rule.end && rule.modulo > 0 && line_no % rule.modulo == rule.mval
}

/// Apply every rule targeting one file, in place
///
/// Each line uses the first rule that selects it. Returns the number of
/// rewritten lines.
pub fn apply_rules(path: &Path, rules: &[&RuleConfig], perturbation: f64) -> Result<usize> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    let mut output = String::with_capacity(contents.len());
    let mut rewritten = 0;

    for (idx, line) in contents.lines().enumerate() {
        let line_no = idx + 1;
        match rules.iter().find(|r| rule_matches(r, line_no)) {
            Some(rule) => {
                let new_line = apply_rule_line(rule, line, perturbation)
                    .with_context(|| format!("{}:{}", path.display(), line_no))?;
                output.push_str(&new_line);
                rewritten += 1;
            }
            None => output.push_str(line),
        }
        output.push('\n');
    }

    fs::write(path, output).with_context(|| format!("Failed to write input file: {}", path.display()))?;

    Ok(rewritten)
}
