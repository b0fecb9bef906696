use anyhow::{Context, anyhow};
use idrange::{
    Allocator, BatchId, IssueRequest, MemoryStore, Namespace, NewRange, OwnerId, OwnerState,
    PublicationId, PublisherId, Store, append_check_digit, validate_identifier,
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::cli::config::{Command, IssueArgs, RangeCommand};

#[derive(Serialize)]
struct Validation<'a> {
    identifier: &'a str,
    namespace: Namespace,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Runs one command against `allocator` and returns its JSON result.
pub fn execute(allocator: &Allocator<MemoryStore>, command: &Command) -> anyhow::Result<Value> {
    match command {
        Command::CheckDigit { namespace, body } => {
            let identifier = append_check_digit(body, *namespace)?;
            Ok(json!({ "namespace": namespace, "identifier": identifier }))
        }
        Command::Validate {
            identifier,
            namespace,
        } => {
            let namespace = namespace
                .or_else(|| Namespace::detect(identifier))
                .ok_or_else(|| anyhow!("cannot tell the namespace of `{identifier}`"))?;
            let error = validate_identifier(identifier, namespace)
                .err()
                .map(|err| err.to_string());
            to_json(&Validation {
                identifier,
                namespace,
                valid: error.is_none(),
                error,
            })
        }
        Command::Range(range) => execute_range(allocator, range),
        Command::Issue(args) => issue(allocator, args),
        Command::Cancel {
            identifier,
            canceled_by,
        } => {
            allocator
                .cancel(identifier, canceled_by)
                .with_context(|| format!("canceling `{identifier}`"))?;
            Ok(json!({ "canceled": identifier }))
        }
        Command::DeleteBatch { batch } => {
            let id = BatchId::new(*batch);
            allocator
                .delete_batch(id)
                .with_context(|| format!("deleting batch {id}"))?;
            to_json(&allocator.batch(id)?)
        }
        Command::Batch { batch } => to_json(&allocator.batch(BatchId::new(*batch))?),
        Command::Status { owner } => to_json(&allocator.owner_status(OwnerId::new(*owner))?),
        Command::Pool { owner } => to_json(&allocator.pool(OwnerId::new(*owner))?),
        Command::SetState { owner, state } => {
            let id = OwnerId::new(*owner);
            let status = allocator
                .set_state(id, *state)
                .with_context(|| format!("moving owner {id} to {state}"))?;
            to_json(&status)
        }
        Command::Candidate {
            namespace,
            publisher,
            category,
        } => match publisher {
            Some(publisher) => to_json(
                &allocator.candidate_subrange(PublisherId::new(*publisher), *namespace)?,
            ),
            None => to_json(&allocator.candidate_range(*namespace, *category)?),
        },
    }
}

fn execute_range(allocator: &Allocator<MemoryStore>, command: &RangeCommand) -> anyhow::Result<Value> {
    match command {
        RangeCommand::Create {
            namespace,
            prefix,
            begin,
            end,
            category,
            active,
        } => {
            let range = allocator
                .create_range(NewRange {
                    namespace: *namespace,
                    prefix: prefix.clone(),
                    category: *category,
                    range_begin: begin.clone(),
                    range_end: end.clone(),
                    state: if *active {
                        OwnerState::Active
                    } else {
                        OwnerState::Inactive
                    },
                })
                .with_context(|| format!("creating {namespace} range {begin}..={end} under `{prefix}`"))?;
            to_json(&range)
        }
        RangeCommand::Grant { range, publisher } => {
            let sub = allocator
                .grant_subrange(OwnerId::new(*range), PublisherId::new(*publisher))
                .with_context(|| format!("granting from range {range}"))?;
            to_json(&sub)
        }
        RangeCommand::DeleteSubrange { subrange } => {
            allocator
                .delete_subrange(OwnerId::new(*subrange))
                .with_context(|| format!("deleting subrange {subrange}"))?;
            Ok(json!({ "deleted": subrange }))
        }
        RangeCommand::List => to_json(&allocator.store().owners()?),
    }
}

fn issue(allocator: &Allocator<MemoryStore>, args: &IssueArgs) -> anyhow::Result<Value> {
    let mut request = IssueRequest::new(
        OwnerId::new(args.owner),
        args.count,
        PublicationId::new(args.publication),
        args.issued_by.clone(),
    );
    if let Some(publication_type) = args.publication_type {
        request = request.with_publication_type(publication_type);
    }
    if let Some(key) = &args.idempotency_key {
        request = request.with_idempotency_key(key.clone());
    }
    let batch = allocator
        .issue_batch(request)
        .with_context(|| format!("issuing {} from owner {}", args.count, args.owner))?;
    to_json(&batch)
}

fn to_json(value: &impl Serialize) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(value)?)
}
