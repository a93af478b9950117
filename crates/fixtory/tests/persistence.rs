use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use serde_json::json;

use fixtory::{
    BuildOptions, Entity, Error, FieldOptions, Invocation, Registry, Result, Saveable, Template,
    Value,
};

#[derive(Debug)]
struct Widget {
    name: String,
    log: Rc<RefCell<Vec<String>>>,
}

impl Saveable for Widget {
    fn save(&self) -> Result<()> {
        self.log.borrow_mut().push(self.name.clone());
        Ok(())
    }
}

impl Entity for Widget {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_saveable(&self) -> Option<&dyn Saveable> {
        Some(self)
    }

    fn to_json(&self) -> serde_json::Value {
        json!({ "widget": self.name })
    }
}

/// Has no persistence capability.
#[derive(Debug)]
struct Sticker;

impl Entity for Sticker {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct Broken;

impl Saveable for Broken {
    fn save(&self) -> Result<()> {
        Err(Error::Persistence("disk full".to_string()))
    }
}

impl Entity for Broken {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_saveable(&self) -> Option<&dyn Saveable> {
        Some(self)
    }
}

fn widget(name: &str, log: &Rc<RefCell<Vec<String>>>) -> Value {
    Value::entity(Widget {
        name: name.to_string(),
        log: Rc::clone(log),
    })
}

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.define("shelf", |schema| {
        schema
            .has_one("featured")
            .define_item("stack", FieldOptions::list())
            .define_item("labelled", FieldOptions::named())
            .has_one("note")
            .embeds_many("bins");
    });
    registry.define("bins", |schema| {
        schema.has_one("content").has_many("extras");
    });
    registry
}

#[test]
fn create_saves_every_reachable_saveable() {
    let registry = registry();
    let log = Rc::new(RefCell::new(Vec::new()));

    let recipe_log = Rc::clone(&log);
    let built = registry
        .create("shelf", BuildOptions::new(), move |t| {
            t.set("featured", widget("featured", &recipe_log))?;
            t.set("stack", widget("stacked", &recipe_log))?;
            t.set("stack", Value::entity(Sticker))?;
            t.put("labelled", "left", widget("labelled", &recipe_log))?;
            t.set("note", "not saveable")?;
            t.embed_many("bins", 1, |bin| {
                bin.set("content", widget("binned", &recipe_log))?;
                bin.set("extras", widget("extra", &recipe_log))
            })
        })
        .expect("create");

    assert_eq!(built.len(), 1);
    assert_eq!(
        *log.borrow(),
        vec!["featured", "stacked", "labelled", "binned", "extra"]
    );
}

#[test]
fn create_saves_named_subtemplates_at_any_depth() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut registry = Registry::new();
    registry.define("cabinet", |schema| {
        schema
            .has_one("label")
            .define_subtemplate("drawers", FieldOptions::named().singular("drawer"));
    });
    registry.define("drawer", |schema| {
        schema
            .has_one("content")
            .define_subtemplate("compartments", FieldOptions::named().singular("compartment"));
    });
    registry.define("compartment", |schema| {
        schema.has_one("content");
    });

    let recipe_log = Rc::clone(&log);
    registry
        .create("cabinet", BuildOptions::new(), move |t| {
            let compartment =
                |c: &mut Template<'_>| c.set("content", widget("deep", &recipe_log));
            let drawer = |d: &mut Template<'_>| {
                d.set("content", widget("drawer", &recipe_log))?;
                d.invoke("compartment", Invocation::new().arg("left").with_build(&compartment))
                    .map(drop)
            };
            t.set("label", widget("cabinet", &recipe_log))?;
            t.invoke("drawer", Invocation::new().arg("top").with_build(&drawer))
                .map(drop)
        })
        .expect("create");

    assert_eq!(*log.borrow(), vec!["cabinet", "drawer", "deep"]);
}

#[test]
fn build_does_not_persist() {
    let registry = registry();
    let log = Rc::new(RefCell::new(Vec::new()));
    let recipe_log = Rc::clone(&log);
    let record = registry
        .build_one("shelf", move |t| t.set("featured", widget("featured", &recipe_log)))
        .expect("build");
    assert!(log.borrow().is_empty());

    record.save().expect("save");
    assert_eq!(*log.borrow(), vec!["featured"]);
}

#[test]
fn persistence_failures_abort_the_create() {
    let registry = registry();
    let result = registry.create("shelf", BuildOptions::new(), |t| {
        t.set("featured", Value::entity(Broken))
    });
    assert!(matches!(result, Err(Error::Persistence(message)) if message == "disk full"));
}

#[test]
fn create_many_saves_each_record() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut registry = Registry::new();
    let preset_log = Rc::clone(&log);
    registry.define("shelf", move |schema| {
        schema
            .has_one("featured")
            .define_preset("stocked", move |t| t.set("featured", widget("stocked", &preset_log)));
    });

    let built = registry
        .create(
            "shelf",
            BuildOptions::new().preset("stocked").quantity(2),
            |_| Ok(()),
        )
        .expect("create");
    assert_eq!(built.len(), 2);
    assert_eq!(*log.borrow(), vec!["stocked", "stocked"]);
}

#[test]
fn record_create_persists_instantiated_values() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut registry = Registry::new();
    let instantiator_log = Rc::clone(&log);
    registry.define("user", move |schema| {
        schema.has_one("name").define_instantiator("accounts", move |record, args| {
            let count = args.first().and_then(Value::as_i64).unwrap_or(1);
            let name = record.get("name").cloned().unwrap_or_default();
            Ok(Value::List(
                (0..count)
                    .map(|index| widget(&format!("{name}-{index}"), &instantiator_log))
                    .collect(),
            ))
        });
    });

    let record = registry
        .build_one("user", |t| t.set("name", "ada"))
        .expect("build");
    let accounts = record.build("accounts", &[Value::Int(2)]).expect("build");
    assert_eq!(
        accounts.to_json(),
        json!([{ "widget": "ada-0" }, { "widget": "ada-1" }])
    );
    assert!(log.borrow().is_empty());

    record
        .create("accounts", &[Value::Int(2)])
        .expect("create");
    assert_eq!(*log.borrow(), vec!["ada-0", "ada-1"]);
}

#[test]
fn entities_downcast_back_to_their_type() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let value = widget("featured", &log);
    let found = value.downcast_ref::<Widget>().expect("widget");
    assert_eq!(found.name, "featured");
    assert!(value.downcast_ref::<Sticker>().is_none());
}
