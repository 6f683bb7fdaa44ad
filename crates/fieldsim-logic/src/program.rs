//! ---
//! fds_section: "01-core-functionality"
//! fds_subsection: "module"
//! fds_type: "source"
//! fds_scope: "code"
//! fds_description: "Expression language and cycle logic programs."
//! fds_version: "v0.0.0-prealpha"
//! fds_owner: "tbd"
//! ---
use std::collections::HashMap;

use fieldsim_memory::TagMemory;
use tracing::{debug, info, trace, warn};

use crate::eval::evaluate;
use crate::parser::Expr;
use crate::value::Value;
use crate::{LogicError, Result};

/// An ordered logic program: insertion order is evaluation order.
#[derive(Debug, Default)]
pub struct LogicProgram {
    steps: Vec<Step>,
}

#[derive(Debug)]
struct Step {
    lhs: String,
    expr: Expr,
}

impl LogicProgram {
    /// Compile a multi-line source block.
    ///
    /// Each non-blank line is either `LHS = RHS` or a bare statement
    /// beginning with `sprintf`; the latter is recorded under a synthetic
    /// name carrying its position so it is never written back to a tag.
    pub fn compile(source: &str) -> Result<Self> {
        let mut steps = Vec::new();

        for line in source.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match line.split_once(" = ") {
                Some((lhs, rhs)) => {
                    let expr = Expr::parse(rhs.trim()).map_err(|message| LogicError::Compile {
                        line: line.to_owned(),
                        message,
                    })?;
                    steps.push(Step {
                        lhs: lhs.trim().to_owned(),
                        expr,
                    });
                }
                None if line.starts_with("sprintf") => {
                    let expr = Expr::parse(line).map_err(|message| LogicError::Compile {
                        line: line.to_owned(),
                        message,
                    })?;
                    steps.push(Step {
                        lhs: format!("sprintf{}", steps.len()),
                        expr,
                    });
                }
                None => {}
            }
        }

        Ok(Self { steps })
    }

    /// Number of compiled steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when the program has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the program against the memory.
    ///
    /// The environment is seeded with the binary and analog snapshots;
    /// assignments feed the environment so later lines see earlier results.
    /// After the run, every result whose name was present in a pre-eval
    /// snapshot is written back with that snapshot's kind; results absent
    /// from both snapshots are discarded.
    pub fn execute(&self, memory: &TagMemory) -> Result<()> {
        if self.steps.is_empty() {
            return Ok(());
        }

        let mut env: HashMap<String, Value> = HashMap::new();
        let mut results: HashMap<String, Value> = HashMap::new();

        let statuses = memory.snapshot_binary();
        for err in &statuses.errors {
            debug!(error = %err, "binary snapshot incomplete");
        }
        for (tag, status) in &statuses.points {
            env.insert(tag.clone(), Value::Bool(*status));
        }

        let values = memory.snapshot_analog();
        for err in &values.errors {
            debug!(error = %err, "analog snapshot incomplete");
        }
        for (tag, value) in &values.points {
            env.insert(tag.clone(), Value::Num(*value));
        }

        for step in &self.steps {
            let result = evaluate(&step.expr, &env).map_err(|message| LogicError::Eval {
                lhs: step.lhs.clone(),
                message,
            })?;

            if step.lhs.starts_with("sprintf") {
                info!(output = %result, "logic output");
                continue;
            }

            // Feed the environment so following lines see this result.
            env.insert(step.lhs.clone(), result.clone());
            results.insert(step.lhs.clone(), result);
        }

        for (tag, value) in results {
            if statuses.points.contains_key(&tag) {
                match value.coerce_bool() {
                    Some(status) => {
                        if let Err(err) = memory.update_binary(&tag, status) {
                            warn!(tag = %tag, error = %err, "binary write-back failed");
                        }
                    }
                    None => warn!(tag = %tag, kind = value.kind(), "result not coercible to binary"),
                }
                continue;
            }

            if values.points.contains_key(&tag) {
                match value.coerce_num() {
                    Some(v) => {
                        if let Err(err) = memory.update_analog(&tag, v) {
                            warn!(tag = %tag, error = %err, "analog write-back failed");
                        }
                    }
                    None => warn!(tag = %tag, kind = value.kind(), "result not coercible to analog"),
                }
                continue;
            }

            trace!(tag = %tag, "logic result not in datastore (this is OK)");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_assignments_and_sprintf_statements() {
        let program = LogicProgram::compile(
            "A = current\n\nsprintf('MW: %f', mw)\nB = A / 3\n",
        )
        .unwrap();
        assert_eq!(program.len(), 3);
    }

    #[test]
    fn compile_errors_name_the_line() {
        let err = LogicProgram::compile("A = 1 +\n").unwrap_err();
        assert!(matches!(err, LogicError::Compile { line, .. } if line == "A = 1 +"));
    }

    #[test]
    fn non_assignment_lines_without_sprintf_are_skipped() {
        let program = LogicProgram::compile("just a comment line\n").unwrap();
        assert!(program.is_empty());
    }

    #[test]
    fn assignment_results_reach_internal_tags() {
        let memory = TagMemory::new();
        memory.register_internal_analog("current", 1.0);
        memory.register_internal_analog("A", 0.0);

        let program = LogicProgram::compile("A = current\n").unwrap();
        program.execute(&memory).unwrap();

        assert_eq!(memory.analog_value("A"), Ok(1.0));
    }

    #[test]
    fn assignment_results_reach_pending_outputs_for_external_tags() {
        let memory = TagMemory::new();
        memory.register_internal_analog("current", 1.0);
        memory.register_external_analog("A", "io-a");
        memory.add_analog_module("io-a", "dev-a");
        memory.add_analog_device("dev-a");

        let program = LogicProgram::compile("A = current\n").unwrap();
        program.execute(&memory).unwrap();

        let mut drained = Vec::new();
        memory
            .drain_analog_outputs(|device, value| -> std::result::Result<(), ()> {
                drained.push((device.to_owned(), value));
                Ok(())
            })
            .unwrap();
        assert_eq!(drained, vec![("dev-a".to_owned(), 1.0)]);
    }

    #[test]
    fn later_lines_see_earlier_results() {
        let memory = TagMemory::new();
        memory.register_internal_analog("base_kv", 13.3);
        memory.register_internal_analog("phase_kv", 0.0);
        memory.register_internal_analog("PhVphA", 0.0);

        let program = LogicProgram::compile(
            "phase_kv = base_kv * (3 ** 0.5)\nPhVphA = (phase_kv * 1000) / 3\n",
        )
        .unwrap();
        program.execute(&memory).unwrap();

        let phase_kv = memory.analog_value("phase_kv").unwrap();
        let phv = memory.analog_value("PhVphA").unwrap();
        assert!((phase_kv - 13.3 * 3f64.sqrt()).abs() < 1e-9);
        assert!((phv - phase_kv * 1000.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn binary_results_keep_their_kind() {
        let memory = TagMemory::new();
        memory.register_internal_binary("tripped", false);
        memory.register_internal_analog("current", 125.0);

        let program = LogicProgram::compile("tripped = current > 100\n").unwrap();
        program.execute(&memory).unwrap();

        assert_eq!(memory.binary_status("tripped"), Ok(true));
    }

    #[test]
    fn results_not_in_the_datastore_are_discarded() {
        let memory = TagMemory::new();
        memory.register_internal_analog("current", 1.0);

        let program = LogicProgram::compile("scratch = current * 2\n").unwrap();
        program.execute(&memory).unwrap();

        assert!(!memory.has_tag("scratch"));
    }

    #[test]
    fn eval_errors_abort_and_name_the_lhs() {
        let memory = TagMemory::new();
        memory.register_internal_analog("a", 0.0);

        let program = LogicProgram::compile("a = missing + 1\n").unwrap();
        let err = program.execute(&memory).unwrap_err();
        assert!(matches!(err, LogicError::Eval { lhs, .. } if lhs == "a"));
    }

    #[test]
    fn empty_program_is_a_no_op() {
        let memory = TagMemory::new();
        LogicProgram::compile("").unwrap().execute(&memory).unwrap();
    }
}
