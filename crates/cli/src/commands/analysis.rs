use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use oxide_core::model::{Artifact, Graph};
use oxide_core::registry::DocSummary;

use super::Session;
use crate::{parse_address, parse_key_values, resolve_oid, resolve_oids, UsageError};

pub fn modules_command(session: &Session, json: bool, all: bool) -> Result<()> {
    let summaries = session.engine.registry().summaries(all);
    if json {
        let serialized = serde_json::to_string_pretty(&summaries)
            .context("Failed to serialize modules to JSON")?;
        println!("{serialized}");
        return Ok(());
    }
    println!("Modules ({}):", summaries.len());
    for doc in summaries {
        println!("  - {} [{}] {}", doc.name, kind_label(&doc), doc.description);
    }
    Ok(())
}

fn kind_label(doc: &DocSummary) -> &'static str {
    if doc.source {
        "source"
    } else if doc.set {
        "set"
    } else if doc.atomic {
        "atomic"
    } else {
        "map/reduce"
    }
}

pub fn doc_command(session: &Session, module: &str, json: bool) -> Result<()> {
    let doc = session.engine.documentation(module)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }
    println!("{} [{}]", doc.name, kind_label(&doc));
    println!("  {}", doc.description);
    if let Some(meta) = &doc.meta {
        println!("  Meta module: {meta}");
    }
    if doc.private {
        println!("  (private)");
    }
    println!("Options ({}):", doc.opts.len());
    if doc.opts.is_empty() {
        println!("  (none)");
    }
    for opt in &doc.opts {
        let default = opt.default.as_ref().map(|v| v.to_string()).unwrap_or_else(|| "required".into());
        println!(
            "  - {} ({:?}, default {default}{}) {}",
            opt.name,
            opt.ty,
            if opt.mangle { ", mangled" } else { "" },
            opt.description
        );
    }
    Ok(())
}

pub fn process_command(
    session: &Session,
    module: &str,
    oids: &[String],
    opts: &[String],
    force: bool,
) -> Result<()> {
    let opts = parse_key_values(opts)?;
    let oids = resolve_oids(&session.engine, oids)?;
    let results = session.engine.process(module, &oids, &opts, force)?;
    let produced = results.values().filter(|ok| **ok).count();
    for (oid, ok) in &results {
        println!("{oid}: {}", if *ok { "ok" } else { "no artifact" });
    }
    println!("{module}: {produced}/{} produced", results.len());
    Ok(())
}

pub fn retrieve_command(
    session: &Session,
    module: &str,
    oid: &str,
    opts: &[String],
    field: Option<&str>,
) -> Result<()> {
    let opts = parse_key_values(opts)?;
    let oid = resolve_oid(&session.engine, oid)?;
    let rendered = match field {
        Some(field) => session
            .engine
            .get_field(module, &oid, field, &opts)?
            .ok_or_else(|| anyhow!("No field '{field}' in {module} artifact of {oid}"))?,
        None => session
            .engine
            .retrieve(module, &oid, &opts)?
            .map(|artifact| artifact.to_json())
            .ok_or_else(|| anyhow!("No {module} artifact for {oid}"))?,
    };
    println!("{}", serde_json::to_string_pretty(&rendered)?);
    Ok(())
}

/// Pick the graph to write from a CFG map or a call graph.
pub fn select_graph(artifact: Artifact, function: Option<u64>) -> Result<Graph> {
    match (artifact, function) {
        (Artifact::CallGraph(cg), _) => Ok(cg.graph),
        (Artifact::Cfgs(mut cfgs), Some(addr)) => cfgs
            .remove(&addr)
            .ok_or_else(|| UsageError(format!("No control-flow graph for function 0x{addr:x}")).into()),
        (Artifact::Cfgs(cfgs), None) => {
            let starts: Vec<String> = cfgs.keys().map(|a| format!("0x{a:x}")).collect();
            Err(UsageError(format!("--function is required; available: {}", starts.join(", "))).into())
        }
        (other, _) => Err(UsageError(format!("A {} artifact is not a graph", other.kind())).into()),
    }
}

pub fn write_graph_command(
    session: &Session,
    module: &str,
    oid: &str,
    function: Option<&str>,
    out: &Path,
) -> Result<()> {
    let oid = resolve_oid(&session.engine, oid)?;
    let function = function.map(parse_address).transpose()?;
    let artifact = session
        .engine
        .retrieve(module, &oid, &Default::default())?
        .ok_or_else(|| anyhow!("No {module} artifact for {oid}"))?;
    let graph = select_graph(artifact, function)?;

    let mut file = fs::File::create(out).with_context(|| format!("Failed to create {}", out.display()))?;
    graph
        .write_adjacency(&mut file)
        .with_context(|| format!("Failed to write graph to {}", out.display()))?;
    println!(
        "Wrote {} nodes / {} edges to {}",
        graph.node_count(),
        graph.edge_count(),
        out.display()
    );
    Ok(())
}
