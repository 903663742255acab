//! Shared fixtures for unit tests: the fictional `ex` package and helpers to
//! run a document through parse, bind and schematize synchronously.

use std::sync::Arc;

use pulumi_yaml_ast::load_template;
use pulumi_yaml_schema::{
    Function, MemoryLoader, ObjectType, Package, Property, Resource, SchemaLoader, Type,
};

use crate::bind::{BinderOptions, Decl};
use crate::cache::SchemaCache;

/// The `ex` package: resource `ex:index:Bucket` (required string input
/// `name`, string output `arn`, map output `tags`) and function
/// `ex:ec2:getVpc` (bool input `default`, string output `id`).
pub(crate) fn ex_package() -> Package {
    let mut pkg = Package::new("ex");
    pkg.description = "An example package".to_string();

    let mut bucket = Resource::new("ex:index:Bucket");
    bucket.comment = "A bucket.".to_string();
    bucket
        .input_properties
        .push(Property::new("name", Type::String).required().with_comment("The bucket name."));
    bucket
        .properties
        .push(Property::new("arn", Type::Output(Arc::new(Type::String))));
    bucket
        .properties
        .push(Property::new("tags", Type::Map(Arc::new(Type::String))));
    pkg.resources.push(Arc::new(bucket));

    let mut get_vpc = Function::new("ex:ec2:getVpc");
    get_vpc.comment = "Look up a VPC.".to_string();
    get_vpc.inputs = Some(ObjectType {
        token: String::new(),
        comment: String::new(),
        properties: vec![Property::new("default", Type::Bool)],
    });
    get_vpc.outputs = Some(ObjectType {
        token: String::new(),
        comment: String::new(),
        properties: vec![Property::new("id", Type::String)],
    });
    pkg.functions.push(Arc::new(get_vpc));
    pkg.provider = Some(Arc::new(Resource::new("pulumi:providers:ex")));
    pkg
}

pub(crate) fn ex_cache() -> SchemaCache {
    let loader: Arc<dyn SchemaLoader> = Arc::new(MemoryLoader::new().with_package(ex_package()));
    SchemaCache::new(loader)
}

pub(crate) fn ex_cache_arc() -> Arc<SchemaCache> {
    Arc::new(ex_cache())
}

/// Run a document through a real pipeline and wait for all three stage
/// publications, so schema attachments are observable.
pub(crate) fn ready_pipeline(source: &str) -> crate::analysis::AnalysisPipeline {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct CountingSink(AtomicUsize);
    impl crate::analysis::DiagnosticsSink for CountingSink {
        fn publish(&self, _uri: &str, _diagnostics: Vec<crate::diagnostic::Diagnostic>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let doc = crate::text::Document::new("file:///test.yaml", "yaml", source, 1);
    let sink = Arc::new(CountingSink::default());
    let pipeline = crate::analysis::AnalysisPipeline::new(
        &doc,
        ex_cache_arc(),
        sink.clone(),
        BinderOptions::default(),
    );
    let start = Instant::now();
    while sink.0.load(Ordering::SeqCst) < 3 {
        if start.elapsed() > Duration::from_secs(5) {
            panic!("analysis never completed");
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    pipeline
}

/// Parse, bind and schematize a source synchronously.
pub(crate) fn analyze(source: &str) -> (pulumi_yaml_ast::Template, Decl) {
    let (template, diags) = load_template("test.yaml", source);
    assert!(diags.is_empty(), "syntax diagnostics: {diags:?}");
    let template = template.unwrap();
    let mut decl = Decl::new(&template, BinderOptions::default());
    decl.load_schema(&ex_cache());
    (template, decl)
}
