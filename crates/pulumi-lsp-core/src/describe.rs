//! Markdown descriptions for hover.

use std::fmt::Write;

use pulumi_yaml_schema::{unwrap_type, Function, Property, Resource};

/// Render a resource descriptor as hover markdown.
pub fn resource_markdown(resource: &Resource) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Resource: {}", resource.token);
    if !resource.comment.is_empty() {
        let _ = writeln!(out, "\n{}", resource.comment);
    }
    if !resource.deprecation_message.is_empty() {
        let _ = writeln!(out, "## Deprecated\n{}", resource.deprecation_message);
    }
    let _ = writeln!(out, "## Inputs");
    for input in &resource.input_properties {
        write_property(&mut out, input);
    }
    let _ = writeln!(out, "## Outputs");
    for output in &resource.properties {
        write_property(&mut out, output);
    }
    out
}

/// Render a function descriptor as hover markdown.
pub fn function_markdown(function: &Function) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Function: {}", function.token);
    if !function.comment.is_empty() {
        let _ = writeln!(out, "\n{}", function.comment);
    }
    if !function.deprecation_message.is_empty() {
        let _ = writeln!(out, "## Deprecated\n{}", function.deprecation_message);
    }
    if let Some(inputs) = &function.inputs {
        let _ = writeln!(out, "## Arguments");
        if !inputs.token.is_empty() {
            let _ = writeln!(out, "**Type:** `{}`", inputs.token);
        }
        for input in &inputs.properties {
            write_property(&mut out, input);
        }
    }
    if let Some(outputs) = &function.outputs {
        let _ = writeln!(out, "## Return");
        if !outputs.token.is_empty() {
            let _ = writeln!(out, "**Type:** `{}`", outputs.token);
        }
        for output in &outputs.properties {
            write_property(&mut out, output);
        }
    }
    out
}

fn write_property(out: &mut String, property: &Property) {
    let _ = writeln!(out, "### {}", property.name);
    let _ = writeln!(out, "**Type:** `{}`\n", unwrap_type(&property.typ));
    if !property.comment.is_empty() {
        let _ = writeln!(out, "{}", property.comment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulumi_yaml_schema::{ObjectType, Type};

    #[test]
    fn resource_markdown_lists_inputs_and_outputs() {
        let mut resource = Resource::new("ex:index:Bucket");
        resource.comment = "A bucket.".into();
        resource
            .input_properties
            .push(Property::new("name", Type::String).with_comment("The name."));
        resource.properties.push(Property::new("arn", Type::String));
        let md = resource_markdown(&resource);
        assert!(md.starts_with("# Resource: ex:index:Bucket"));
        assert!(md.contains("## Inputs"));
        assert!(md.contains("### name"));
        assert!(md.contains("**Type:** `string`"));
        assert!(md.contains("## Outputs"));
        assert!(md.contains("### arn"));
    }

    #[test]
    fn function_markdown_covers_signature() {
        let mut function = Function::new("ex:ec2:getVpc");
        function.deprecation_message = "use getVpcs".into();
        function.inputs = Some(ObjectType {
            token: "ex:ec2:getVpcArgs".into(),
            comment: String::new(),
            properties: vec![Property::new("default", Type::Bool)],
        });
        let md = function_markdown(&function);
        assert!(md.starts_with("# Function: ex:ec2:getVpc"));
        assert!(md.contains("## Deprecated"));
        assert!(md.contains("## Arguments"));
        assert!(md.contains("`ex:ec2:getVpcArgs`"));
        assert!(md.contains("### default"));
    }
}
