use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{read_text, write_output};
use crate::skills::{Action, Handler, HandlerContext, ParamKind, ParamSpec};

/// Sorts a JSON contact list by last name, then first name.
pub struct SortContactsHandler;

#[derive(Debug, Deserialize)]
pub struct SortContactsParams {
    input_file: PathBuf,
    output_file: PathBuf,
}

fn field<'a>(contact: &'a Value, name: &str) -> &'a str {
    contact.get(name).and_then(Value::as_str).unwrap_or("")
}

/// Stable sort; missing or non-string names sort as empty strings.
fn sort_contacts(contacts: &mut [Value]) {
    contacts.sort_by(|a, b| {
        field(a, "last_name")
            .cmp(field(b, "last_name"))
            .then_with(|| field(a, "first_name").cmp(field(b, "first_name")))
    });
}

#[async_trait]
impl Handler for SortContactsHandler {
    type Params = SortContactsParams;

    fn action(&self) -> Action {
        Action::SortContacts
    }

    fn description(&self) -> &'static str {
        "Sort a JSON array of contacts by last_name then first_name and write it out."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input_file", ParamKind::Path),
            ParamSpec::required("output_file", ParamKind::Path),
        ]
    }

    async fn run(&self, params: SortContactsParams, ctx: &HandlerContext) -> anyhow::Result<String> {
        let text = read_text(&params.input_file, ctx).await?;
        let mut contacts: Vec<Value> = serde_json::from_str(&text).with_context(|| {
            format!(
                "{} is not a JSON array of contacts",
                ctx.gate.display(&params.input_file)
            )
        })?;

        sort_contacts(&mut contacts);
        write_output(&params.output_file, serde_json::to_vec(&contacts)?, ctx).await?;

        Ok(format!(
            "{} contacts sorted into {}",
            contacts.len(),
            ctx.gate.display(&params.output_file)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::context;
    use crate::skills::Invoke;
    use serde_json::json;

    const CONTACTS: &str = r#"[
        {"first_name": "Zoe", "last_name": "Adams", "email": "zoe@example.com"},
        {"first_name": "Amy", "last_name": "Brown", "email": "amy@example.com"},
        {"first_name": "Bob", "last_name": "Adams", "email": "bob@example.com"},
        {"first_name": "Cal", "email": "cal@example.com"}
    ]"#;

    fn params(root: &std::path::Path, output: &str) -> serde_json::Map<String, Value> {
        json!({
            "input_file": root.join("contacts.json"),
            "output_file": root.join(output),
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn test_sort_order() {
        let mut contacts: Vec<Value> = serde_json::from_str(CONTACTS).unwrap();
        sort_contacts(&mut contacts);
        let names: Vec<&str> = contacts.iter().map(|c| field(c, "first_name")).collect();
        assert_eq!(names, vec!["Cal", "Bob", "Zoe", "Amy"]);
    }

    #[test]
    fn test_sort_is_stable_for_equal_keys() {
        let mut contacts = vec![
            json!({"first_name": "Ann", "last_name": "Lee", "id": 1}),
            json!({"first_name": "Ann", "last_name": "Lee", "id": 2}),
        ];
        sort_contacts(&mut contacts);
        assert_eq!(contacts[0]["id"], 1);
        assert_eq!(contacts[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_output_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("contacts.json"), CONTACTS).unwrap();
        let ctx = context(dir.path());
        let root = ctx.gate.root().to_path_buf();

        let message = SortContactsHandler
            .invoke(params(&root, "a.json"), &ctx)
            .await
            .unwrap();
        assert_eq!(message, "4 contacts sorted into /data/a.json");
        SortContactsHandler
            .invoke(params(&root, "b.json"), &ctx)
            .await
            .unwrap();

        let a = std::fs::read(dir.path().join("a.json")).unwrap();
        let b = std::fs::read(dir.path().join("b.json")).unwrap();
        assert_eq!(a, b);
        let sorted: Vec<Value> = serde_json::from_slice(&a).unwrap();
        assert_eq!(sorted[0]["first_name"], "Cal");
    }

    #[tokio::test]
    async fn test_not_an_array_is_handler_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("contacts.json"), r#"{"not": "a list"}"#).unwrap();
        let ctx = context(dir.path());
        let root = ctx.gate.root().to_path_buf();

        let err = SortContactsHandler
            .invoke(params(&root, "out.json"), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::agent::ErrorKind::HandlerError);
        assert!(err.to_string().contains("/data/contacts.json"));
    }
}
