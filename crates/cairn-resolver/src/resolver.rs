use cairn_task::{Reference, Task, TaskKey, TaskMap};
use tracing::debug;

use crate::error::{Reason, ResolveError, Unresolved};

/// Bind every reference field of every task in `tasks` to its target.
///
/// A target is a task whose kind is one the field accepts and whose name
/// equals the field's target name. A task of another kind with the same
/// name is not a candidate. Resolving an already resolved map is a no-op.
pub fn resolve<C>(tasks: &TaskMap<C>) -> Result<(), ResolveError>
where
  C: Send + Sync + 'static,
{
  let mut failures = Vec::new();
  let mut bound = 0usize;

  for (owner, task) in tasks.iter() {
    for field in task.references() {
      let reference = field.reference;
      let expected = reference.kinds();
      let candidates = tasks.candidates(&expected, reference.target());

      let reason = match candidates.as_slice() {
        [] => Some(Reason::Missing),
        [(key, target)] => match reference.bind((*key).clone(), (*target).clone().into_any()) {
          Ok(()) => {
            bound += 1;
            None
          }
          Err(err) => Some(Reason::Conflict(err)),
        },
        many => Some(Reason::Ambiguous {
          candidates: many.iter().map(|(key, _)| TaskKey::clone(key)).collect(),
        }),
      };

      if let Some(reason) = reason {
        failures.push(Unresolved {
          owner: owner.clone(),
          field: field.name,
          target: reference.target().to_string(),
          expected,
          reason,
        });
      }
    }
  }

  if failures.is_empty() {
    debug!(tasks = tasks.len(), references = bound, "references resolved");
    Ok(())
  } else {
    Err(ResolveError::Unresolved { failures })
  }
}
