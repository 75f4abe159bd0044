use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::ShaderStage;

use crate::compose::{ComposedProgram, FRAGMENT_ENTRY_POINT, VERTEX_ENTRY_POINT};
use crate::error::CompilationError;

/// Parses and validates a composed program with naga's WGSL front end.
///
/// Runs without a GPU, so it doubles as the headless check and as the first
/// stage of every backend compile. Diagnostics are rendered against the
/// composed text, which is what line numbers refer to.
pub fn validate_program(program: &ComposedProgram) -> Result<naga::Module, CompilationError> {
    let source = program.source();
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|err| CompilationError::new(err.emit_to_string(source)))?;

    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|err| CompilationError::new(err.emit_to_string(source)))?;

    require_entry_point(&module, VERTEX_ENTRY_POINT, ShaderStage::Vertex)?;
    require_entry_point(&module, FRAGMENT_ENTRY_POINT, ShaderStage::Fragment)?;
    Ok(module)
}

fn require_entry_point(
    module: &naga::Module,
    name: &str,
    stage: ShaderStage,
) -> Result<(), CompilationError> {
    let found = module
        .entry_points
        .iter()
        .any(|entry| entry.name == name && entry.stage == stage);
    if found {
        Ok(())
    } else {
        Err(CompilationError::new(format!(
            "program has no {stage:?} entry point named `{name}`"
        )))
    }
}
