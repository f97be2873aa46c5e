//! Parameter expansion: template -> concrete targets.

use anvil_core::project::{Project, Target, TargetTemplate};
use anvil_core::{Error, Result};
use regex::{NoExpand, Regex};
use tracing::warn;

/// Expand one template into the cartesian product of its parameter axes.
///
/// Axes expand in declaration order, axis i varying slower than axis i+1
/// (nested iteration). For each tuple, every axis's pattern is replaced by
/// the chosen value (a global regex substitution) in the name template and
/// in every step argument token, in axis order. Later axes substitute into
/// the output of earlier ones, so a pattern that matches text introduced by
/// an earlier axis's value makes the axis order observable; keep patterns
/// disjoint from values.
///
/// A template with zero axes yields exactly one target. An axis with an
/// empty value list yields zero targets; that is not an error, but it is
/// logged as a likely misconfiguration.
pub fn expand(project: &Project, template: &TargetTemplate) -> Result<Vec<Target>> {
    let axes: Vec<Regex> = template
        .parameters
        .iter()
        .map(|axis| {
            Regex::new(&axis.pattern).map_err(|e| Error::InvalidPattern {
                pattern: axis.pattern.clone(),
                message: e.to_string(),
            })
        })
        .collect::<Result<_>>()?;

    // Index tuples over the axes, built by nested iteration so earlier axes
    // are the outer loops.
    let mut combos: Vec<Vec<usize>> = vec![Vec::new()];
    for axis in &template.parameters {
        let mut next = Vec::with_capacity(combos.len() * axis.values.len());
        for combo in &combos {
            for value_idx in 0..axis.values.len() {
                let mut extended = combo.clone();
                extended.push(value_idx);
                next.push(extended);
            }
        }
        combos = next;
    }

    if combos.is_empty() {
        warn!(
            project = %project.name,
            template = %template.name,
            "parameter axis with empty value list, template expands to nothing"
        );
        return Ok(Vec::new());
    }

    let targets = combos
        .into_iter()
        .map(|combo| {
            let substitutions: Vec<(&Regex, &str)> = combo
                .iter()
                .enumerate()
                .map(|(axis_idx, &value_idx)| {
                    (
                        &axes[axis_idx],
                        template.parameters[axis_idx].values[value_idx].as_str(),
                    )
                })
                .collect();

            Target {
                project: project.name.clone(),
                repo_url: project.url.clone(),
                name: apply_all(&substitutions, &template.name),
                branch: template.branch.clone(),
                steps: template
                    .steps
                    .iter()
                    .map(|step| {
                        step.iter()
                            .map(|token| apply_all(&substitutions, token))
                            .collect()
                    })
                    .collect(),
                required_capabilities: template.required_capabilities.clone(),
            }
        })
        .collect();

    Ok(targets)
}

fn apply_all(substitutions: &[(&Regex, &str)], source: &str) -> String {
    substitutions.iter().fold(
        source.to_string(),
        |acc, (pattern, value)| pattern.replace_all(&acc, NoExpand(value)).into_owned(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anvil_core::project::ParameterAxis;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn project() -> Project {
        Project {
            name: "riscv-gcc".to_string(),
            url: "https://example.com/riscv-gcc.git".to_string(),
            templates: vec![],
        }
    }

    fn template(
        name: &str,
        steps: Vec<Vec<&str>>,
        parameters: Vec<ParameterAxis>,
    ) -> TargetTemplate {
        TargetTemplate {
            name: name.to_string(),
            branch: "master".to_string(),
            steps: steps
                .into_iter()
                .map(|s| s.into_iter().map(str::to_string).collect())
                .collect(),
            parameters,
            required_capabilities: BTreeSet::new(),
        }
    }

    fn axis(pattern: &str, values: &[&str]) -> ParameterAxis {
        ParameterAxis {
            pattern: pattern.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn zero_axes_yield_template_unmodified() {
        let t = template("plain", vec![vec!["make", "all"]], vec![]);
        let targets = expand(&project(), &t).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "plain");
        assert_eq!(targets[0].steps, vec![vec!["make", "all"]]);
        assert_eq!(targets[0].qualified_name(), "riscv-gcc@plain");
    }

    #[test]
    fn single_axis_substitutes_name_and_steps() {
        let t = template(
            "gcc-ARCH",
            vec![vec!["build", "ARCH"]],
            vec![axis("ARCH", &["x86", "arm"])],
        );
        let targets = expand(&project(), &t).unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].name, "gcc-x86");
        assert_eq!(targets[0].steps, vec![vec!["build", "x86"]]);
        assert_eq!(targets[1].name, "gcc-arm");
        assert_eq!(targets[1].steps, vec![vec!["build", "arm"]]);
    }

    #[test]
    fn product_size_and_axis_order() {
        // Axis 0 (size 2) must vary slower than axis 1 (size 3).
        let t = template(
            "ARCH-LIBC",
            vec![vec!["make", "ARCH", "LIBC"]],
            vec![
                axis("ARCH", &["rv32", "rv64"]),
                axis("LIBC", &["glibc", "musl", "newlib"]),
            ],
        );
        let targets = expand(&project(), &t).unwrap();
        assert_eq!(targets.len(), 6);
        let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "rv32-glibc",
                "rv32-musl",
                "rv32-newlib",
                "rv64-glibc",
                "rv64-musl",
                "rv64-newlib",
            ]
        );
    }

    #[test]
    fn empty_axis_yields_zero_targets() {
        let t = template(
            "gcc-ARCH-LIBC",
            vec![vec!["make"]],
            vec![axis("ARCH", &["rv64"]), axis("LIBC", &[])],
        );
        let targets = expand(&project(), &t).unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn substitution_replaces_every_occurrence() {
        let t = template(
            "ARCH",
            vec![vec!["echo", "ARCH-ARCH"], vec!["touch", "ARCH.done"]],
            vec![axis("ARCH", &["rv64"])],
        );
        let targets = expand(&project(), &t).unwrap();
        assert_eq!(targets[0].steps[0], vec!["echo", "rv64-rv64"]);
        assert_eq!(targets[0].steps[1], vec!["touch", "rv64.done"]);
    }

    #[test]
    fn replacement_value_is_literal() {
        // `$` in a value must not be treated as a capture-group reference.
        let t = template(
            "v-VER",
            vec![vec!["echo", "VER"]],
            vec![axis("VER", &["$1.0"])],
        );
        let targets = expand(&project(), &t).unwrap();
        assert_eq!(targets[0].steps[0], vec!["echo", "$1.0"]);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        let t = template("x", vec![vec!["make"]], vec![axis("[", &["a"])]);
        assert!(matches!(
            expand(&project(), &t),
            Err(Error::InvalidPattern { .. })
        ));
    }
}
