use regex::Regex;
use serde_json::json;

use fixtory::{
    BuildOptions, Built, Error, FieldOptions, Invocation, Invoked, Registry, Value, map,
};

fn widget_registry() -> Registry {
    let mut registry = Registry::new();
    registry.define("widget", |schema| {
        schema
            .define_item("name", FieldOptions::default().alias("label"))
            .define_item("doodads", FieldOptions::list().singular("doodad"))
            .define_item("gizmos", FieldOptions::named().singular("gizmo"))
            .define_item("tags", FieldOptions::named())
            .define_subtemplate("widget_part", FieldOptions::default().alias("part"))
            .define_subtemplate("thingamabobs", FieldOptions::list().singular("thingamabob"))
            .define_subtemplate("labels", FieldOptions::named().singular("sticker").template("thingamabob"))
            .define_preset("shiny", |t| t.set("name", "shiny widget"))
            .define_pattern_preset(Regex::new(r"^size_\d+$").expect("regex"), |t, key| {
                t.set("name", key.clone())
            })
            .define_macro("rename", |t, args| {
                let prefix = args.first().cloned().unwrap_or_default();
                let suffix = args.get(1).cloned().unwrap_or_default();
                t.set("name", format!("{prefix}-{suffix}"))
            });
    });
    registry.define("widget_part", |schema| {
        schema
            .has_one("kind")
            .define_preset("bolt", |t| t.set("kind", "bolt"));
    });
    registry.define("thingamabob", |schema| {
        schema
            .has_one("color")
            .has_one("kind")
            .define_preset("red", |t| t.set("color", "red"));
    });
    registry
}

#[test]
fn has_one_stores_arguments_blocks_and_aliases() {
    let registry = widget_registry();
    let record = registry
        .build_one("widget", |t| t.set("label", "gadget"))
        .expect("build");
    assert_eq!(record.get("name"), Some(&Value::from("gadget")));

    let record = registry
        .build_one("widget", |t| t.set_with("name", || Value::from("from block")))
        .expect("build");
    assert_eq!(record.get("name"), Some(&Value::from("from block")));

    let record = registry
        .build_one("widget", |t| t.invoke("name", Invocation::new()).map(drop))
        .expect("build");
    assert_eq!(record.get("name"), Some(&Value::Null));
}

#[test]
fn singular_list_invocations_accumulate() {
    let registry = widget_registry();
    let record = registry
        .build_one("widget", |t| t.set("doodad", "x"))
        .expect("build");
    assert_eq!(record.to_json(), json!({ "doodads": ["x"] }));

    let record = registry
        .build_one("widget", |t| {
            t.set("doodad", "x")?;
            t.set("doodad", "x")
        })
        .expect("build");
    assert_eq!(record.to_json(), json!({ "doodads": ["x", "x"] }));
}

#[test]
fn null_singular_items_are_dropped() {
    let registry = widget_registry();
    let record = registry
        .build_one("widget", |t| {
            let invoked = t.invoke("doodad", Invocation::new().arg(Value::Null))?;
            assert!(matches!(invoked, Invoked::Skipped));
            t.put("gizmo", "left", Value::Null)?;
            t.set("doodad", "x")
        })
        .expect("build");
    assert_eq!(record.to_json(), json!({ "doodads": ["x"] }));
}

#[test]
fn plural_list_forms() {
    let registry = widget_registry();
    let record = registry
        .build_one("widget", |t| {
            t.invoke("doodads", Invocation::new().args(["a", "b"]))?;
            t.invoke("doodads", Invocation::new().arg(vec!["c", "d"]))?;
            let produce = || Value::from("e");
            t.invoke("doodads", Invocation::new().arg(2).with_value(&produce))?;
            t.invoke("doodad", Invocation::new().args(["f", "g"]))?;
            Ok(())
        })
        .expect("build");

    assert_eq!(
        record.to_json(),
        json!({ "doodads": ["a", "b", "c", "d", "e", "e", ["f", "g"]] })
    );
}

#[test]
fn plural_list_rejects_a_lone_map() {
    let registry = widget_registry();
    let result = registry.build_one("widget", |t| t.set("doodads", map([("a", 1)])));
    assert!(matches!(result, Err(Error::UnsupportedOperation(_))));
}

#[test]
fn named_items_take_keys_and_merge_maps() {
    let registry = widget_registry();
    let record = registry
        .build_one("widget", |t| {
            t.put("gizmo", "left", 1)?;
            t.put("gizmo", "left", 2)?;
            t.set("gizmos", map([("right", 3)]))?;
            t.put("tags", "color", "red")?;
            t.set("tags", map([("size", "xl")]))
        })
        .expect("build");

    assert_eq!(
        record.to_json(),
        json!({
            "gizmos": { "left": 2, "right": 3 },
            "tags": { "color": "red", "size": "xl" }
        })
    );
}

#[test]
fn named_singular_requires_a_key() {
    let registry = widget_registry();
    let result = registry.build_one("widget", |t| t.invoke("gizmo", Invocation::new()).map(drop));
    assert!(matches!(result, Err(Error::MissingFieldName(field)) if field == "gizmos"));
}

#[test]
fn named_item_key_without_value_is_dropped() {
    let registry = widget_registry();
    let record = registry
        .build_one("widget", |t| {
            let invoked = t.invoke("gizmo", Invocation::new().arg(1))?;
            assert!(matches!(invoked, Invoked::Skipped));
            Ok(())
        })
        .expect("build");
    assert!(!record.contains("gizmos"));
}

#[test]
fn embeds_one_with_block_preset_or_nothing() {
    let registry = widget_registry();
    let record = registry
        .build_one("widget", |t| t.embed("part", |part| part.set("kind", "nut")))
        .expect("build");
    assert_eq!(record.to_json(), json!({ "widget_part": { "kind": "nut" } }));

    let record = registry
        .build_one("widget", |t| t.embed_preset("widget_part", "bolt"))
        .expect("build");
    assert_eq!(record.to_json(), json!({ "widget_part": { "kind": "bolt" } }));

    let record = registry
        .build_one("widget", |t| t.invoke("widget_part", Invocation::new()).map(drop))
        .expect("build");
    assert_eq!(record.to_json(), json!({ "widget_part": {} }));
}

#[test]
fn embeds_many_by_quantity_preset_and_block() {
    let mut registry = Registry::new();
    registry.define("widget", |schema| {
        schema.embeds_many("doodad");
    });
    registry.define("doodad", |schema| {
        schema
            .has_one("finish")
            .define_preset("shiny", |t| t.set("finish", "shiny"));
    });

    let record = registry
        .build_one("widget", |t| t.set("doodad", 2))
        .expect("build");
    assert_eq!(record.to_json(), json!({ "doodad": [{}, {}] }));

    let record = registry
        .build_one("widget", |t| t.embed_preset("doodad", "shiny"))
        .expect("build");
    assert_eq!(record.to_json(), json!({ "doodad": [{ "finish": "shiny" }] }));

    let record = registry
        .build_one("widget", |t| {
            t.invoke("doodad", Invocation::new().args([Value::Int(2), Value::from("shiny")]))?;
            t.embed_many("doodad", 1, |doodad| doodad.set("finish", "matte"))
        })
        .expect("build");
    assert_eq!(
        record.to_json(),
        json!({ "doodad": [{ "finish": "shiny" }, { "finish": "shiny" }, { "finish": "matte" }] })
    );
}

#[test]
fn singular_subtemplate_appends_one_record() {
    let registry = widget_registry();
    let record = registry
        .build_one("widget", |t| {
            t.embed_preset("thingamabob", "red")?;
            t.embed("thingamabob", |bob| bob.set("color", "blue"))
        })
        .expect("build");
    assert_eq!(
        record.to_json(),
        json!({ "thingamabobs": [{ "color": "red" }, { "color": "blue" }] })
    );
}

#[test]
fn plural_subtemplate_list_is_stored_verbatim() {
    let registry = widget_registry();
    let record = registry
        .build_one("widget", |t| t.set("thingamabobs", vec![1, 2]))
        .expect("build");
    assert_eq!(record.to_json(), json!({ "thingamabobs": [1, 2] }));
}

#[test]
fn named_subtemplates_use_template_option_and_keys() {
    let registry = widget_registry();
    let record = registry
        .build_one("widget", |t| {
            t.put("sticker", "front", "red")?;
            t.invoke("sticker", Invocation::new().arg(7)).map(drop)
        })
        .expect("build");
    assert_eq!(
        record.to_json(),
        json!({ "labels": { "front": { "color": "red" }, "7": {} } })
    );

    let result = registry.build_one("widget", |t| t.set("labels", map([("a", 1)])));
    assert!(matches!(result, Err(Error::UnsupportedOperation(_))));
}

#[test]
fn value_blocks_are_rejected_by_subtemplates() {
    let registry = widget_registry();
    let result = registry.build_one("widget", |t| t.set_with("part", || Value::Int(1)));
    assert!(matches!(result, Err(Error::UnsupportedOperation(_))));
}

#[test]
fn unresolved_subtemplates_error() {
    let mut registry = Registry::new();
    registry.define("widget", |schema| {
        schema.embeds_one("sprocket");
    });
    let result = registry.build_one("widget", |t| t.invoke("sprocket", Invocation::new()).map(drop));
    assert!(matches!(
        result,
        Err(Error::UnresolvedSubtemplate { field, .. }) if field == "sprocket"
    ));
}

#[test]
fn macros_receive_arguments() {
    let registry = widget_registry();
    let record = registry
        .build_one("widget", |t| t.call("rename", ["big", "red"]))
        .expect("build");
    assert_eq!(record.get("name"), Some(&Value::from("big-red")));
    assert!(!record.contains("rename"));
}

#[test]
fn unknown_fields_error() {
    let registry = widget_registry();
    let result = registry.build_one("widget", |t| t.set("sprocket", 1));
    assert!(matches!(
        result,
        Err(Error::UnknownField { template, field }) if template == "widget" && field == "sprocket"
    ));
}

#[test]
fn presets_fan_out_by_quantity() {
    let registry = widget_registry();
    let built = registry.build_preset("widget", "shiny", 3).expect("build");
    let Built::Many(records) = built else {
        panic!("expected many records");
    };
    assert_eq!(records.len(), 3);
    assert!(
        records
            .iter()
            .all(|record| record.get("name") == Some(&Value::from("shiny widget")))
    );

    let built = registry.build_preset("widget", Value::Null, 2).expect("build");
    assert_eq!(built.to_json(), json!([{}, {}]));
}

#[test]
fn pattern_presets_receive_the_key() {
    let registry = widget_registry();
    let record = registry
        .build_preset("widget", "size_12", 1)
        .expect("build")
        .into_record()
        .expect("record");
    assert_eq!(record.get("name"), Some(&Value::from("size_12")));
}

#[test]
fn preset_and_quantity_errors() {
    let registry = widget_registry();
    assert!(matches!(
        registry.build_preset("widget", "rusty", 1),
        Err(Error::UnknownPreset { template, preset }) if template == "widget" && preset == "rusty"
    ));
    assert!(matches!(
        registry.build_preset("widget", "shiny", 0),
        Err(Error::NonPositiveQuantity(0))
    ));
    assert!(matches!(
        registry.build_preset("widget", "shiny", "two"),
        Err(Error::InvalidQuantity(_))
    ));
    assert!(matches!(
        registry.build("gadget", BuildOptions::new(), |_| Ok(())),
        Err(Error::UnknownTemplate(name)) if name == "gadget"
    ));
}

#[test]
fn build_body_is_ignored_when_a_preset_is_given() {
    let registry = widget_registry();
    let built = registry
        .build("widget", BuildOptions::new().preset("shiny"), |t| t.set("name", "ignored"))
        .expect("build");
    assert_eq!(built.to_json(), json!({ "name": "shiny widget" }));
}

#[test]
fn transients_flow_down_but_not_back_up() {
    let mut registry = Registry::new();
    registry.define("order", |schema| {
        schema.has_one("currency").embeds_one("line");
    });
    registry.define("line", |schema| {
        schema.has_one("currency");
    });

    let built = registry
        .build("order", BuildOptions::new().transient("currency", "EUR"), |t| {
            t.embed("line", |line| {
                let currency = line.transient("currency").cloned().unwrap_or_default();
                line.set("currency", currency)?;
                line.set_transient("currency", "USD");
                Ok(())
            })?;
            let currency = t.transient("currency").cloned().unwrap_or_default();
            t.set("currency", currency)
        })
        .expect("build");

    assert_eq!(
        built.to_json(),
        json!({ "currency": "EUR", "line": { "currency": "EUR" } })
    );
}

#[test]
fn instantiators_convert_records() {
    let mut registry = Registry::new();
    registry.define("user", |schema| {
        schema
            .has_one("name")
            .define_instantiator("greeting", |record, args| {
                let name = record.get("name").cloned().unwrap_or_default();
                let punctuation = args.first().cloned().unwrap_or(Value::from("."));
                Ok(Value::Text(format!("hello {name}{punctuation}")))
            });
    });

    let record = registry
        .build_one("user", |t| t.set("name", "ada"))
        .expect("build");
    assert_eq!(
        record.build("greeting", &[Value::from("!")]).expect("instantiate"),
        Value::from("hello ada!")
    );
    assert!(matches!(
        record.build("missing", &[]),
        Err(Error::UnknownInstantiator { instantiator, .. }) if instantiator == "missing"
    ));
}
