//! Configuration validation

use super::*;
use crate::simulation::rules::{count_tokens, FormatToken};
use anyhow::{Context, Result};
use std::collections::HashSet;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_main(&config.main)?;
    validate_parameters(&config.parameters)?;

    for (i, rule) in config.rules.iter().enumerate() {
        validate_rule(rule).with_context(|| format!("Invalid rule #{} ({})", i + 1, rule.file.display()))?;
    }

    if let Some(ref graph) = config.graph {
        validate_graph(graph)?;
    }

    Ok(())
}

/// Validate the `[main]` block
pub fn validate_main(main: &MainConfig) -> Result<()> {
    if main.run_name.trim().is_empty() {
        anyhow::bail!("run_name must not be empty");
    }

    if main.run_sim {
        if main.exe.as_deref().map_or(true, |exe| exe.trim().is_empty()) {
            anyhow::bail!("run_sim requires an exe");
        }
        if main.data_dir.is_none() {
            anyhow::bail!("run_sim requires a data_dir");
        }
    }

    if main.outputs.is_empty() {
        anyhow::bail!("at least one output file must be listed in outputs");
    }

    Ok(())
}

/// Validate `[[parameters]]`
pub fn validate_parameters(parameters: &[ParameterConfig]) -> Result<()> {
    let mut seen = HashSet::new();

    for param in parameters {
        if param.name.trim().is_empty() {
            anyhow::bail!("parameter name must not be empty");
        }
        if param.name.contains('\0') {
            anyhow::bail!("parameter name {:?} contains a null byte", param.name);
        }
        if !seen.insert(param.name.as_str()) {
            anyhow::bail!("duplicate parameter: {}", param.name);
        }
        if let Some(ref partner) = param.pearson {
            if partner.trim().is_empty() {
                anyhow::bail!("parameter {} has an empty pearson partner", param.name);
            }
        }
        if param.mask().is_empty() {
            eprintln!("Warning: parameter {} requests no statistics", param.name);
        }
    }

    Ok(())
}

/// Validate one `[[rules]]` entry
pub fn validate_rule(rule: &RuleConfig) -> Result<()> {
    if rule.start == 0 {
        anyhow::bail!("start is 1-based, got 0");
    }
    if rule.start > rule.end {
        anyhow::bail!("start ({}) must not exceed end ({})", rule.start, rule.end);
    }
    if rule.modulo == 0 {
        anyhow::bail!("modulo must be greater than 0");
    }
    if rule.mval >= rule.modulo {
        anyhow::bail!("mval ({}) must be less than modulo ({})", rule.mval, rule.modulo);
    }
    if !rule.transperc.is_finite() {
        anyhow::bail!("transperc must be finite");
    }

    let input_tokens = count_tokens(&rule.format);
    let output_tokens = count_tokens(&rule.outformat);
    if input_tokens == 0 {
        anyhow::bail!("format must not be empty");
    }
    if output_tokens < input_tokens {
        anyhow::bail!(
            "outformat has {} token(s) but format has {}",
            output_tokens,
            input_tokens
        );
    }

    for token in rule.format.split_whitespace() {
        if let FormatToken::Unsupported(conversion) = FormatToken::parse(token) {
            anyhow::bail!("unsupported conversion in format: {}", conversion);
        }
    }

    Ok(())
}

/// Validate `[graph]`
pub fn validate_graph(graph: &GraphConfig) -> Result<()> {
    if graph.key.trim().is_empty() {
        anyhow::bail!("graph key must not be empty");
    }
    if graph.lower > graph.upper {
        anyhow::bail!(
            "graph lower bound ({}) must not exceed upper bound ({})",
            graph.lower,
            graph.upper
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_block() -> MainConfig {
        MainConfig {
            run_name: "run".to_string(),
            exe: Some("./sim".to_string()),
            data_dir: Some(PathBuf::from("template")),
            simulator: "utchem".to_string(),
            outputs: vec![PathBuf::from("OUT")],
            run_sim: true,
            list_keys: false,
            symmetry: Symmetry::Symmetric,
            work_dir: PathBuf::from("."),
        }
    }

    fn rule() -> RuleConfig {
        RuleConfig {
            file: PathBuf::from("INPUT"),
            start: 2,
            end: 4,
            modulo: 2,
            mval: 0,
            format: "%f %d".to_string(),
            outformat: "%10.4f %5d".to_string(),
            transperc: 10.0,
        }
    }

    #[test]
    fn test_validate_main() {
        assert!(validate_main(&main_block()).is_ok());

        let mut main = main_block();
        main.run_name = "  ".to_string();
        assert!(validate_main(&main).is_err());

        let mut main = main_block();
        main.exe = None;
        assert!(validate_main(&main).is_err());

        // Analysis-only runs need neither exe nor data_dir
        main.run_sim = false;
        main.data_dir = None;
        assert!(validate_main(&main).is_ok());

        main.outputs.clear();
        assert!(validate_main(&main).is_err());
    }

    #[test]
    fn test_validate_duplicate_parameters() {
        let params = vec![
            ParameterConfig {
                name: "PERM".to_string(),
                sum: true,
                ..Default::default()
            },
            ParameterConfig {
                name: "PERM".to_string(),
                mean: true,
                ..Default::default()
            },
        ];
        assert!(validate_parameters(&params).is_err());
        assert!(validate_parameters(&params[..1]).is_ok());
    }

    #[test]
    fn test_validate_empty_partner() {
        let params = vec![ParameterConfig {
            name: "PERM".to_string(),
            pearson: Some(String::new()),
            ..Default::default()
        }];
        assert!(validate_parameters(&params).is_err());
    }

    #[test]
    fn test_validate_rule() {
        assert!(validate_rule(&rule()).is_ok());

        let mut r = rule();
        r.start = 5;
        assert!(validate_rule(&r).is_err());

        let mut r = rule();
        r.modulo = 0;
        assert!(validate_rule(&r).is_err());

        let mut r = rule();
        r.mval = 2;
        assert!(validate_rule(&r).is_err());

        let mut r = rule();
        r.outformat = "%10.4f".to_string();
        assert!(validate_rule(&r).is_err());

        let mut r = rule();
        r.format = "%s %d".to_string();
        assert!(validate_rule(&r).is_err());
    }

    #[test]
    fn test_validate_graph() {
        let graph = GraphConfig {
            key: "POROSITY".to_string(),
            lower: 0.5,
            upper: 0.1,
        };
        assert!(validate_graph(&graph).is_err());

        let graph = GraphConfig {
            lower: 0.1,
            upper: 0.1,
            ..graph
        };
        assert!(validate_graph(&graph).is_ok());
    }
}
