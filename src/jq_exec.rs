use anyhow::{anyhow, Context, Result};
use jaq_core::{load, Compiler, Ctx, RcIter};
use jaq_json::Val;
use serde_json::Value;

/// Run a jq filter over `input`, collecting every output as JSON.
pub fn run_jaq(filter_src: &str, input: &Value) -> Result<Vec<Value>> {
    let loader = load::Loader::new(jaq_std::defs().chain(jaq_json::defs()));
    let arena = load::Arena::default();
    let program = load::File { code: filter_src, path: () };

    let modules = loader.load(&arena, program).map_err(|errs| {
        invalid_filter(filter_src, errs.into_iter().map(|(_, err)| format!("{err:?}")))
    })?;

    let filter = Compiler::default()
        .with_funs(jaq_std::funs().chain(jaq_json::funs()))
        .compile(modules)
        .map_err(|errs| {
            let undefined = errs
                .into_iter()
                .flat_map(|(_, names)| names)
                .map(|(name, undef)| format!("undefined {undef:?} `{name}`"));
            invalid_filter(filter_src, undefined)
        })?;

    let inputs = RcIter::new(core::iter::empty());
    let mut it = filter.run((Ctx::new([], &inputs), Val::from(input.clone())));

    let mut out = Vec::new();
    while let Some(item) = it.next() {
        let v = item.map_err(|e| anyhow!("jq runtime error: {e:?}"))?;
        let text = format!("{v}");
        let value = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("jq output is not JSON: {text}"))?;
        out.push(value);
    }
    Ok(out)
}

/// The filter's first output; a filter producing nothing is an error.
pub fn first_output(filter_src: &str, input: &Value) -> Result<Value> {
    let outputs = run_jaq(filter_src, input)?;
    if outputs.len() > 1 {
        tracing::warn!(filter = filter_src, outputs = outputs.len(), "jq filter produced several outputs, using the first");
    }
    outputs
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("jq filter `{filter_src}` produced no output"))
}

/// One error for every problem jaq found while loading or compiling.
fn invalid_filter(filter_src: &str, problems: impl Iterator<Item = String>) -> anyhow::Error {
    let problems: Vec<String> = problems.collect();
    anyhow!("invalid jq filter `{filter_src}`: {}", problems.join("; "))
}
