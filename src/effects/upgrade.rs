//! In-memory migration of older effect documents.

use serde_json::{Value, json};

use super::schema::{EffectType, SAVE_FORMAT};

/// Brings a document up to [`SAVE_FORMAT`].
///
/// Pure and idempotent: a current document comes back unchanged, and
/// documents newer than this build are left alone for the loader to refuse.
pub fn upgrade(mut doc: Value) -> Value {
    let Some(obj) = doc.as_object_mut() else {
        return doc;
    };
    let Some(format) = obj.get("save_format").and_then(Value::as_u64) else {
        return doc;
    };
    if format >= u64::from(SAVE_FORMAT) {
        return doc;
    }

    // 1 -> 2: revision counter, device icon and optimisation hints
    obj.entry("revision").or_insert(json!(1));
    obj.entry("map_device_icon").or_insert(json!(""));
    let scripted = obj
        .get("type")
        .and_then(Value::as_u64)
        .and_then(EffectType::from_code)
        == Some(EffectType::Scripted);
    if scripted {
        obj.entry("optimised_for").or_insert(json!([]));
    }

    obj.insert(String::from("save_format"), json!(SAVE_FORMAT));
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn v1_scripted() -> Value {
        json!({
            "name": "Pulse",
            "type": 2,
            "author": "",
            "author_url": "",
            "icon": "",
            "summary": "",
            "map_device": "",
            "map_graphic": "",
            "map_cols": 0,
            "map_rows": 0,
            "save_format": 1,
            "required_os": ["linux"],
            "parameters": [],
            "designed_for": []
        })
    }

    #[test]
    fn fills_fields_added_in_format_two() {
        let doc = upgrade(v1_scripted());

        assert_eq!(doc["save_format"], json!(2));
        assert_eq!(doc["revision"], json!(1));
        assert_eq!(doc["map_device_icon"], json!(""));
        assert_eq!(doc["optimised_for"], json!([]));
        assert!(super::super::validate::validate(&doc).is_empty());
    }

    #[test]
    fn keeps_existing_values() {
        let mut old = v1_scripted();
        old["revision"] = json!(7);
        let doc = upgrade(old);
        assert_eq!(doc["revision"], json!(7));
    }

    #[test]
    fn newer_documents_untouched() {
        let mut doc = v1_scripted();
        doc["save_format"] = json!(SAVE_FORMAT + 1);
        assert_eq!(upgrade(doc.clone()), doc);
    }

    proptest! {
        #[test]
        fn upgrade_is_idempotent(
            format in 0u64..4,
            code in 1u64..4,
            revision in proptest::option::of(0u64..100),
            has_icon in any::<bool>(),
        ) {
            let mut doc = json!({ "name": "P", "type": code, "save_format": format });
            if let Some(revision) = revision {
                doc["revision"] = json!(revision);
            }
            if has_icon {
                doc["map_device_icon"] = json!("img/kbd.svg");
            }

            let once = upgrade(doc);
            prop_assert_eq!(upgrade(once.clone()), once);
        }
    }
}
