use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use octofhir_export::{ExportRequest, ExportService, RequestedAttribute, Scope};

use crate::cli::{CompileArgs, ScopeArgs};

pub fn compile(service: &ExportService, args: &CompileArgs) -> Result<()> {
    let request = match &args.request {
        Some(path) => load_request(path)?,
        None => {
            if args.attributes.is_empty() {
                anyhow::bail!("Nothing to compile: pass --attribute or --request");
            }
            let attributes = args
                .attributes
                .iter()
                .map(RequestedAttribute::named)
                .collect();
            ExportRequest::new(attributes)
        }
    };
    let request = apply_scope(request, &args.scope);

    let query = service.prepare(&request)?;
    println!("{}", query.sql);
    eprintln!(
        "{} {}",
        "Attributes:".cyan(),
        query.attributes.join(", ")
    );
    Ok(())
}

pub fn load_request(path: &Path) -> Result<ExportRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {}", path.display()))?;
    let request = ExportRequest::parse(&content)
        .with_context(|| format!("Invalid request file: {}", path.display()))?;
    Ok(request)
}

/// Scope flags override the ones in the request file.
fn apply_scope(mut request: ExportRequest, scope: &ScopeArgs) -> ExportRequest {
    let current: &mut Scope = &mut request.scope;
    if let Some(practitioner) = &scope.practitioner {
        current.practitioner_id = Some(practitioner.clone());
    }
    if let Some(group) = &scope.group {
        current.group_id = Some(group.clone());
    }
    if let Some(birthdate) = &scope.birthdate {
        current.birthdate_condition = Some(birthdate.clone());
    }
    request
}
