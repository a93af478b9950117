use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::preset::Recipe;

static NEXT_HOOK_ID: AtomicU64 = AtomicU64::new(1);

/// Which builds a default hook applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HookContext {
    /// Around every build of the owning schema.
    #[default]
    All,
    /// Around each subtemplate field population the owning schema performs.
    Embedded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunPolicy {
    #[default]
    Always,
    /// At most once per record under construction.
    Once,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Before,
    After,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Before => f.write_str("before"),
            Stage::After => f.write_str("after"),
        }
    }
}

/// Declaration options for a default hook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HookOptions {
    #[serde(default)]
    pub context: HookContext,
    #[serde(default)]
    pub run: RunPolicy,
}

impl HookOptions {
    pub fn embedded() -> Self {
        Self {
            context: HookContext::Embedded,
            run: RunPolicy::Always,
        }
    }

    pub fn once(mut self) -> Self {
        self.run = RunPolicy::Once;
        self
    }
}

#[derive(Clone)]
pub enum HookAction {
    Recipe(Recipe),
    /// Apply a preset of the owning schema by name.
    Preset(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(u64);

/// A recipe (or preset reference) that supplies default field values.
#[derive(Clone)]
pub struct DefaultHook {
    id: HookId,
    options: HookOptions,
    action: HookAction,
}

impl DefaultHook {
    pub(crate) fn new(options: HookOptions, action: HookAction) -> Self {
        Self {
            id: HookId(NEXT_HOOK_ID.fetch_add(1, Ordering::Relaxed)),
            options,
            action,
        }
    }

    pub fn id(&self) -> HookId {
        self.id
    }

    pub fn options(&self) -> HookOptions {
        self.options
    }

    pub fn action(&self) -> &HookAction {
        &self.action
    }
}

impl fmt::Debug for DefaultHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match &self.action {
            HookAction::Recipe(_) => "recipe".to_string(),
            HookAction::Preset(name) => format!("preset:{name}"),
        };
        f.debug_struct("DefaultHook")
            .field("id", &self.id)
            .field("options", &self.options)
            .field("action", &action)
            .finish()
    }
}

/// Ordered hooks for one stage, partitioned by context.
#[derive(Debug, Default, Clone)]
pub struct Hooks {
    all: Vec<Rc<DefaultHook>>,
    embedded: Vec<Rc<DefaultHook>>,
}

impl Hooks {
    pub(crate) fn push(&mut self, hook: DefaultHook) {
        match hook.options.context {
            HookContext::All => self.all.push(Rc::new(hook)),
            HookContext::Embedded => self.embedded.push(Rc::new(hook)),
        }
    }

    pub fn for_context(&self, context: HookContext) -> &[Rc<DefaultHook>] {
        match context {
            HookContext::All => &self.all,
            HookContext::Embedded => &self.embedded,
        }
    }

    pub fn len(&self) -> usize {
        self.all.len() + self.embedded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `Once` hooks already run by one template.
///
/// Each record under construction owns its claims, so a parent's embedded
/// hooks stay claimed across all of its subtemplate populations while every
/// nested or sibling record runs its own hooks afresh.
#[derive(Debug, Default)]
pub(crate) struct HookClaims {
    invoked: HashSet<HookId>,
}

impl HookClaims {
    /// Whether `hook` should run now; `Once` hooks are claimed on first use.
    pub(crate) fn claim(&mut self, hook: &DefaultHook) -> bool {
        match hook.options.run {
            RunPolicy::Always => true,
            RunPolicy::Once => self.invoked.insert(hook.id),
        }
    }
}
