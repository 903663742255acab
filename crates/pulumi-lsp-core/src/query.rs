//! Positional queries: map a cursor position to the smallest enclosing
//! semantic object.
//!
//! Queries poll pipeline stages without blocking; a stage that has not
//! caught up yet surfaces as [`QueryError::NotReady`] and the handler
//! returns no answer rather than stalling the editor.

use std::sync::Arc;

use pulumi_yaml_schema::{Function, Resource};

use crate::analysis::AnalysisPipeline;
use crate::bind::Reference;
use crate::describe;
use crate::position::{promote_range, Position, Range};
use crate::step::StepResult;

/// Why a query produced no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Analysis has not caught up to this document version yet.
    #[error("analysis is not ready")]
    NotReady,
    /// Analysis finished without a usable result for this stage.
    #[error("no analysis result available")]
    Unavailable,
}

/// The semantic object under the cursor.
pub enum Object {
    Resource {
        range: Range,
        schema: Option<Arc<Resource>>,
    },
    Invoke {
        range: Range,
        schema: Option<Arc<Function>>,
    },
    Reference {
        range: Range,
        reference: Reference,
    },
}

impl Object {
    pub fn range(&self) -> Range {
        match self {
            Object::Resource { range, .. }
            | Object::Invoke { range, .. }
            | Object::Reference { range, .. } => *range,
        }
    }

    /// A markdown description, when the object has one.
    pub fn describe(&self) -> Option<String> {
        match self {
            Object::Resource { schema, .. } => {
                schema.as_ref().map(|r| describe::resource_markdown(r))
            }
            Object::Invoke { schema, .. } => {
                schema.as_ref().map(|f| describe::function_markdown(f))
            }
            Object::Reference { .. } => None,
        }
    }
}

/// Find the object at `pos`: a resource whose type token contains it, an
/// invoke whose token contains it, or a reference whose interpolation
/// contains it, in that order.
pub fn object_at_point(
    pipeline: &AnalysisPipeline,
    pos: Position,
) -> Result<Option<Object>, QueryError> {
    let (template, _) = match pipeline.parsed().try_get() {
        StepResult::Ready(result) => result,
        StepResult::Pending | StepResult::Cancelled => return Err(QueryError::NotReady),
    };
    let Some(template) = template else {
        return Err(QueryError::Unavailable);
    };

    let decl = match pipeline.bound().try_get() {
        StepResult::Ready(decl) => decl,
        StepResult::Pending | StepResult::Cancelled => return Err(QueryError::NotReady),
    };
    let decl = decl.read().unwrap_or_else(|poisoned| poisoned.into_inner());

    for entry in &template.resources {
        let Some(body) = &entry.body else { continue };
        let Some(token) = &body.type_token else { continue };
        if !promote_range(token.range).contains(pos) {
            continue;
        }
        let version = body.options.version.as_ref().map(|v| v.value.as_str());
        let found = decl
            .get_resources(&token.value, version)
            .map_err(|_| QueryError::Unavailable)?;
        let Some(binding) = found.first() else {
            return Ok(None);
        };
        return Ok(Some(Object::Resource {
            range: promote_range(entry.range),
            schema: binding.schema.clone(),
        }));
    }

    for invoke in decl.invokes() {
        if invoke.token_range.contains(pos) {
            return Ok(Some(Object::Invoke {
                range: invoke.expr_range,
                schema: invoke.schema.clone(),
            }));
        }
    }

    for reference in decl.references() {
        if reference.location.contains(pos) {
            return Ok(Some(Object::Reference {
                range: reference.location,
                reference: reference.clone(),
            }));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ready_pipeline;

    const DOC: &str = "\
resources:
  my:
    type: ex:index:Bucket
    properties:
      name: hello
outputs:
  o: ${my.arn}
";

    #[test]
    fn resource_type_token_hits() {
        let pipeline = ready_pipeline(DOC);
        // Line 2 is `    type: ex:index:Bucket`; the token starts at col 10.
        let object = object_at_point(&pipeline, Position::new(2, 12))
            .unwrap()
            .expect("expected an object");
        match object {
            Object::Resource { schema, .. } => {
                assert_eq!(schema.unwrap().token, "ex:index:Bucket");
            }
            _ => panic!("expected a resource"),
        }
    }

    #[test]
    fn reference_hits_inside_interpolation() {
        let pipeline = ready_pipeline(DOC);
        // Line 6 is `  o: ${my.arn}`.
        let object = object_at_point(&pipeline, Position::new(6, 9))
            .unwrap()
            .expect("expected an object");
        match object {
            Object::Reference { reference, .. } => {
                assert_eq!(reference.variable, "my");
                assert_eq!(reference.accessors.len(), 1);
            }
            _ => panic!("expected a reference"),
        }
    }

    #[test]
    fn invoke_token_hits() {
        let source = "variables:\n  vpc:\n    fn::invoke:\n      function: ex:ec2:getVpc\noutputs:\n  o: ${vpc}\n";
        let pipeline = ready_pipeline(source);
        // Line 3 is `      function: ex:ec2:getVpc`.
        let object = object_at_point(&pipeline, Position::new(3, 20))
            .unwrap()
            .expect("expected an object");
        match object {
            Object::Invoke { schema, .. } => {
                assert_eq!(schema.unwrap().token, "ex:ec2:getVpc");
            }
            _ => panic!("expected an invoke"),
        }
    }

    #[test]
    fn empty_space_finds_nothing() {
        let pipeline = ready_pipeline(DOC);
        assert!(object_at_point(&pipeline, Position::new(1, 0))
            .unwrap()
            .is_none());
    }

    #[test]
    fn hover_markdown_for_a_resource() {
        let pipeline = ready_pipeline(DOC);
        let object = object_at_point(&pipeline, Position::new(2, 12))
            .unwrap()
            .unwrap();
        let markdown = object.describe().unwrap();
        assert!(markdown.contains("# Resource: ex:index:Bucket"));
        assert!(markdown.contains("name"));
    }
}
