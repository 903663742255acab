//! Diagnostic constructors used by binding and schema resolution.

use crate::diagnostic::Diagnostic;
use crate::position::Range;

pub(crate) fn property_starts_with_index(text: &str, loc: Option<Range>) -> Diagnostic {
    Diagnostic::warning(
        "Property access starts with index",
        format!("Property accesses should start with a bound name: {text}"),
        loc,
    )
}

pub(crate) fn duplicate_source(name: &str, subject: Option<Range>, prev: Option<Range>) -> Diagnostic {
    Diagnostic::error(
        "Duplicate Binding",
        format!("'{name}' has already been bound"),
        subject,
    )
    .with_related(prev)
}

pub(crate) fn duplicate_key(key: &str, subject: Option<Range>) -> Diagnostic {
    Diagnostic::warning(
        "Duplicate key",
        format!("'{key}' has already been used as a key in this map"),
        subject,
    )
}

pub(crate) fn variable_does_not_exist(name: &str, use_loc: Option<Range>) -> Diagnostic {
    Diagnostic::error(
        format!("Missing variable '{name}'"),
        format!(
            "Reference to non-existent variable '{name}'. \
             Consider adding a '{name}' to the variables section."
        ),
        use_loc,
    )
}

pub(crate) fn unused_variable(name: &str, loc: Option<Range>) -> Diagnostic {
    Diagnostic::warning(format!("Variable '{name}' is unused"), "", loc)
}

pub(crate) fn property_does_not_exist(
    prop: &str,
    parent: &str,
    mut suggestions: Vec<String>,
    loc: Option<Range>,
) -> Diagnostic {
    suggestions.sort();
    let detail = if suggestions.is_empty() {
        String::new()
    } else {
        format!("Existing properties are: {}", suggestions.join(", "))
    };
    Diagnostic::error(
        format!("Property '{prop}' does not exist on {parent}"),
        detail,
        loc,
    )
}

pub(crate) fn no_property_access(typ: &str, loc: Option<Range>) -> Diagnostic {
    Diagnostic::error(format!("Property access not supported for {typ}"), "", loc)
}

pub(crate) fn no_property_index(typ: &str, loc: Option<Range>) -> Diagnostic {
    Diagnostic::error(format!("Indexing not supported for {typ}"), "", loc)
}

pub(crate) fn unparsable_token(token: &str, err: &dyn std::fmt::Display, loc: Option<Range>) -> Diagnostic {
    Diagnostic::error(
        format!("Could not parse '{token}' as a schema type: {err}"),
        "Valid schema tokens are of the form `${pkg}:${module}:${Type}` \
         or `${pkg}:${Type}`. Providers take the form `pulumi:providers:${pkg}`",
        loc,
    )
}

pub(crate) fn multiple_resources(token: &str, loc: Option<Range>) -> Diagnostic {
    Diagnostic::warning(
        format!("More than one resource/alias points toward '{token}'"),
        "This indicates a problem with the backing schema, not your code. \
         Contact the package author with this message.",
        loc,
    )
}

pub(crate) fn failed_to_load_package(pkg: &str, err: &str, loc: Option<Range>) -> Diagnostic {
    Diagnostic::warning(
        format!("Failed to load package '{pkg}'"),
        format!("Error: {err}"),
        loc,
    )
}

pub(crate) fn missing_token(pkg: &str, token: &str, loc: Option<Range>) -> Diagnostic {
    Diagnostic::error(format!("'{token}' doesn't exist in '{pkg}'"), "", loc)
}

pub(crate) fn deprecated(item: &str, msg: &str, loc: Option<Range>) -> Diagnostic {
    Diagnostic::warning(format!("'{item}' is deprecated"), msg, loc)
}

pub(crate) fn empty_property_access(loc: Option<Range>) -> Diagnostic {
    Diagnostic::error("Empty interpolate expressions are not allowed", "", loc)
}

pub(crate) fn missing_required_property(prop: &str, loc: Option<Range>) -> Diagnostic {
    Diagnostic::error(format!("Missing required property '{prop}'"), "", loc)
}

pub(crate) fn missing_resource_body(name: &str, loc: Option<Range>) -> Diagnostic {
    Diagnostic::error(format!("Resource {name} is missing a body"), "", loc)
}

pub(crate) fn missing_resource_type(name: &str, loc: Option<Range>) -> Diagnostic {
    Diagnostic::error(format!("Resource {name} is missing a `type` key"), "", loc)
}

pub(crate) fn internal_error(detail: &str) -> Diagnostic {
    Diagnostic::error(
        "Internal error while analyzing the document",
        detail.to_string(),
        None,
    )
}
