use std::{env, fmt::Write, fs};

use helm::{
    MonomerGraph, MonomerLibrary, Result, chain::decompose, import, natural_sequence, serialize, transport,
    xhelm,
};
use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, IntoDiagnostic};
use rustyline::DefaultEditor;

fn main() -> miette::Result<()> {
    env_logger::init();

    // An optional path to a KDL monomer library, replacing the built-in one
    let library = match env::args().nth(1) {
        Some(path) => {
            let kdl = fs::read_to_string(&path).into_diagnostic()?;
            MonomerLibrary::new(&path, kdl)?
        }
        None => MonomerLibrary::embedded()?,
    };
    log::info!("loaded {} monomers", library.monomers().count());

    let mut rl = DefaultEditor::new().into_diagnostic()?;
    while let Ok(line) = rl.readline("HELM: ") {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        rl.add_history_entry(line).into_diagnostic()?;
        match describe(&library, line) {
            Ok(description) => print!("{description}"),
            Err(diagnostic) => render_error(diagnostic),
        }
    }
    Ok(())
}

/// Reads XHELM, HELM, or a plain sequence, and reports what it describes
fn describe(library: &MonomerLibrary, input: &str) -> Result<String> {
    let graph = if input.starts_with('<') {
        xhelm::read(input)?.parse(library)?
    } else {
        import::read(library, input)?
    };

    let mut buf = String::new();
    let notation = serialize(&graph)?;
    // NOTE: Writing to a `String` never fails
    let _ = writeln!(buf, "Notation: {notation}");
    for (index, line) in natural_sequence(&graph, library)?.lines().enumerate() {
        let _ = writeln!(buf, "Natural Sequence {}: {line}", index + 1);
    }
    let _ = writeln!(buf, "{}", summary(&graph));
    match transport::compress(&notation) {
        Ok(payload) => {
            let _ = writeln!(buf, "Compressed: {payload}");
        }
        Err(error) => log::warn!("failed to compress the notation: {error}"),
    }
    let _ = writeln!(buf);
    Ok(buf)
}

fn summary(graph: &MonomerGraph) -> String {
    let decomposition = decompose(graph);
    let circles = decomposition.chains.iter().filter(|c| c.is_circle()).count();
    format!(
        "Monomers: {}, Bonds: {}, Chains: {} ({circles} circular), Branches: {}",
        graph.node_count(),
        graph.bond_count(),
        decomposition.chains.len(),
        decomposition.branches.len()
    )
}

fn render_error(diagnostic: impl Diagnostic) {
    let mut buf = String::new();
    match GraphicalReportHandler::new_themed(GraphicalTheme::unicode()).render_report(&mut buf, &diagnostic) {
        Ok(()) => println!("{buf}"),
        Err(_) => println!("{diagnostic}"),
    }
}
