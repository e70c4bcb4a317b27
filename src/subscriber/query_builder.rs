use serde_json::Value;

use super::database::{DocumentDatabase, Query};
use super::error::SubscriberResult;
use super::settings::SubscriberSettings;
use super::spec::FilterGroup;

/// Builds one query per filter group, or a single unfiltered query when there
/// are no groups. String values containing the placeholder get `uid` spliced in.
pub fn build_queries(
    database: &dyn DocumentDatabase,
    collection: &str,
    groups: &[FilterGroup],
    uid: &str,
    settings: &SubscriberSettings,
) -> SubscriberResult<Vec<Query>> {
    let reference = database.collection(collection)?;
    if groups.is_empty() {
        return Ok(vec![database.query(reference, Vec::new())]);
    }

    Ok(groups
        .iter()
        .map(|group| {
            let filters = group
                .iter()
                .map(|filter| {
                    filter.with_value(substitute_placeholder(filter.value(), uid, settings))
                })
                .collect();
            database.query(reference.clone(), filters)
        })
        .collect())
}

/// Plain textual substitution; non-string values pass through untouched.
pub fn substitute_placeholder(value: &Value, uid: &str, settings: &SubscriberSettings) -> Value {
    match value {
        Value::String(text)
            if !settings.placeholder.is_empty() && text.contains(&settings.placeholder) =>
        {
            let replaced = if settings.replace_all_placeholders {
                text.replace(&settings.placeholder, uid)
            } else {
                text.replacen(&settings.placeholder, uid, 1)
            };
            Value::String(replaced)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::database::MemoryDatabase;
    use crate::subscriber::spec::FieldFilter;
    use serde_json::json;

    #[test]
    fn one_query_per_group_with_substitution() {
        let database = MemoryDatabase::new();
        let groups = vec![
            vec![FieldFilter::new("owner", "==", "{userId}")],
            vec![
                FieldFilter::new("members", "array-contains", "{userId}"),
                FieldFilter::new("open", "==", true),
            ],
        ];

        let queries =
            build_queries(&database, "tasks", &groups, "uid-42", &SubscriberSettings::default())
                .unwrap();

        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].filters()[0].value(), &json!("uid-42"));
        assert_eq!(queries[1].filters()[0].value(), &json!("uid-42"));
        assert_eq!(queries[1].filters()[1].value(), &json!(true));
        assert!(queries.iter().all(|query| query.collection().path() == "tasks"));
    }

    #[test]
    fn no_groups_means_single_unfiltered_query() {
        let database = MemoryDatabase::new();
        let queries =
            build_queries(&database, "news", &[], "uid", &SubscriberSettings::default()).unwrap();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].filters().is_empty());
    }

    #[test]
    fn invalid_collection_is_reported() {
        let database = MemoryDatabase::new();
        assert!(
            build_queries(&database, "users/u1", &[], "uid", &SubscriberSettings::default())
                .is_err()
        );
    }

    #[test]
    fn substitution_is_textual() {
        let settings = SubscriberSettings::default();
        assert_eq!(
            substitute_placeholder(&json!("users/{userId}/inbox"), "abc", &settings),
            json!("users/abc/inbox")
        );
        assert_eq!(
            substitute_placeholder(&json!("{userId}-{userId}"), "abc", &settings),
            json!("abc-{userId}")
        );
        assert_eq!(
            substitute_placeholder(
                &json!("{userId}-{userId}"),
                "abc",
                &settings.clone().with_replace_all_placeholders(true)
            ),
            json!("abc-abc")
        );
        assert_eq!(
            substitute_placeholder(&json!("public"), "abc", &settings),
            json!("public")
        );
        assert_eq!(substitute_placeholder(&json!(7), "abc", &settings), json!(7));
        assert_eq!(
            substitute_placeholder(&json!(["{userId}"]), "abc", &settings),
            json!(["{userId}"])
        );
    }
}
