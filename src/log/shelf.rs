#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Versioned snapshots of a script environment.
//!
//! Only values with a [`ShelfValue`] form are ever written, each with the
//! engine's type tag. Unshelving rebuilds every value and rejects the whole
//! shelf if any binding fails the admission filter or does not reproduce its
//! declared tag, or if a shelved definition replaces a host function or
//! defines a function the filter does not admit.

use std::collections::BTreeMap;

use rhai::{Array, Blob, Dynamic, Engine, FnPtr, Map, Module, Scope, Shared};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{FUNCTION_TAG, SHELF_VERSION},
    error::GradingError,
    runtime::{Definition, Environment, Notebook, is_host_function},
};

/// Restricts which bindings are shelved and unshelved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdmissionFilter {
    /// Keep only these names, whatever their type.
    Names(Vec<String>),
    /// Keep only these names, and only with exactly this type tag.
    Types(BTreeMap<String, String>),
}

/// How a filter treats one binding.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Admission {
    /// Keep it.
    Admitted,
    /// The filter does not mention this name.
    Unlisted,
    /// Listed, but with another type.
    WrongType(String),
}

impl AdmissionFilter {
    /// Decides whether a binding called `name` with type `tag` is admitted.
    fn admission(&self, name: &str, tag: &str) -> Admission {
        match self {
            AdmissionFilter::Names(names) => {
                if names.iter().any(|n| n == name) {
                    Admission::Admitted
                } else {
                    Admission::Unlisted
                }
            }
            AdmissionFilter::Types(types) => match types.get(name) {
                None => Admission::Unlisted,
                Some(expected) if expected == tag => Admission::Admitted,
                Some(expected) => Admission::WrongType(expected.clone()),
            },
        }
    }

    /// Returns true if the script function `name` may be restored. Functions
    /// are listed by name, or with the tag `Fn` in a type map.
    fn admits_function(&self, name: &str) -> bool {
        self.admission(name, FUNCTION_TAG) == Admission::Admitted
    }
}

/// Names in `functions` that may not be restored under `filter`.
fn refused_functions<'a>(
    functions: impl IntoIterator<Item = &'a str>,
    filter: Option<&AdmissionFilter>,
) -> Vec<&'a str> {
    functions
        .into_iter()
        .filter(|name| {
            is_host_function(name) || filter.is_some_and(|filter| !filter.admits_function(name))
        })
        .collect()
}

/// A serializable script value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ShelfValue {
    /// `()`
    Unit,
    /// Booleans.
    Bool(bool),
    /// Integers.
    Int(i64),
    /// Floats.
    Float(f64),
    /// Characters.
    Char(char),
    /// Strings.
    Str(String),
    /// Byte blobs.
    Blob(Vec<u8>),
    /// Arrays of shelvable values.
    Array(Vec<ShelfValue>),
    /// Object maps of shelvable values.
    Map(BTreeMap<String, ShelfValue>),
    /// A function pointer to a named script function.
    FnPtr {
        /// Function name.
        name:  String,
        /// Curried arguments.
        curry: Vec<ShelfValue>,
    },
}

impl ShelfValue {
    /// Converts a script value, or returns `None` if it has no shelf form.
    pub fn from_dynamic(value: &Dynamic) -> Option<Self> {
        let value = value.flatten_clone();

        if value.is_unit() {
            return Some(ShelfValue::Unit);
        }
        if let Ok(b) = value.as_bool() {
            return Some(ShelfValue::Bool(b));
        }
        if let Ok(i) = value.as_int() {
            return Some(ShelfValue::Int(i));
        }
        if let Ok(f) = value.as_float() {
            return Some(ShelfValue::Float(f));
        }
        if let Ok(c) = value.as_char() {
            return Some(ShelfValue::Char(c));
        }
        if value.is_string() {
            return value.into_string().ok().map(ShelfValue::Str);
        }
        if value.is::<Blob>() {
            return value.try_cast::<Blob>().map(ShelfValue::Blob);
        }
        if value.is::<Array>() {
            return value
                .try_cast::<Array>()?
                .iter()
                .map(ShelfValue::from_dynamic)
                .collect::<Option<Vec<_>>>()
                .map(ShelfValue::Array);
        }
        if value.is::<Map>() {
            return value
                .try_cast::<Map>()?
                .iter()
                .map(|(key, v)| ShelfValue::from_dynamic(v).map(|v| (key.to_string(), v)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(ShelfValue::Map);
        }
        if value.is::<FnPtr>() {
            let fn_ptr = value.try_cast::<FnPtr>()?;
            if fn_ptr.is_anonymous() {
                return None;
            }
            let curry = fn_ptr
                .curry()
                .iter()
                .map(ShelfValue::from_dynamic)
                .collect::<Option<Vec<_>>>()?;
            return Some(ShelfValue::FnPtr {
                name: fn_ptr.fn_name().to_string(),
                curry,
            });
        }
        None
    }

    /// Rebuilds the script value.
    pub fn to_dynamic(&self) -> Result<Dynamic, GradingError> {
        Ok(match self {
            ShelfValue::Unit => Dynamic::UNIT,
            ShelfValue::Bool(b) => Dynamic::from_bool(*b),
            ShelfValue::Int(i) => Dynamic::from_int(*i),
            ShelfValue::Float(f) => Dynamic::from_float(*f),
            ShelfValue::Char(c) => Dynamic::from_char(*c),
            ShelfValue::Str(s) => Dynamic::from(s.clone()),
            ShelfValue::Blob(bytes) => Dynamic::from_blob(bytes.clone()),
            ShelfValue::Array(items) => Dynamic::from_array(
                items
                    .iter()
                    .map(ShelfValue::to_dynamic)
                    .collect::<Result<Array, _>>()?,
            ),
            ShelfValue::Map(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.as_str().into(), value.to_dynamic()?);
                }
                Dynamic::from_map(map)
            }
            ShelfValue::FnPtr { name, curry } => {
                let mut fn_ptr = FnPtr::new(name.as_str()).map_err(|e| {
                    GradingError::ShelfDeserialization(format!("bad function pointer `{name}`: {e}"))
                })?;
                for arg in curry {
                    fn_ptr.add_curry(arg.to_dynamic()?);
                }
                Dynamic::from(fn_ptr)
            }
        })
    }
}

/// One shelved variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelvedBinding {
    /// Variable name.
    pub name:     String,
    /// Engine type name of the value.
    pub type_tag: String,
    /// The value itself.
    pub value:    ShelfValue,
}

/// A versioned environment snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shelf {
    /// Schema version.
    pub version:     u32,
    /// Variables in scope order.
    pub bindings:    Vec<ShelvedBinding>,
    /// Source of every unit that defined script functions.
    pub definitions: Vec<String>,
}

/// Snapshots a live scope, returning the shelf and the names of bindings
/// that were left out because they cannot be shelved or have the wrong type.
/// A unit that defines a host function, or under a filter any function the
/// filter does not admit, is left out whole and its refused functions are
/// reported as `fn <name>`.
///
/// * `scope`: the live variables
/// * `definitions`: units that defined script functions
/// * `filter`: optional admission filter
pub fn shelve(
    scope: &Scope,
    definitions: &[Definition],
    filter: Option<&AdmissionFilter>,
) -> (Shelf, Vec<String>) {
    // Later bindings shadow earlier ones with the same name.
    let mut latest: Vec<(String, Dynamic)> = Vec::new();
    for (name, _, value) in scope.iter() {
        match latest.iter_mut().find(|(existing, _)| existing == name) {
            Some(slot) => slot.1 = value,
            None => latest.push((name.to_string(), value)),
        }
    }

    let mut bindings = Vec::new();
    let mut not_shelved = Vec::new();
    for (name, value) in latest {
        let value = value.flatten();
        if value.is::<Notebook>() || value.is::<Shared<Module>>() || value.is::<Module>() {
            not_shelved.push(name);
            continue;
        }

        let type_tag = value.type_name().to_string();
        if let Some(filter) = filter {
            match filter.admission(&name, &type_tag) {
                Admission::Admitted => {}
                Admission::Unlisted => continue,
                Admission::WrongType(expected) => {
                    tracing::warn!("Not shelving `{name}`: expected {expected}, found {type_tag}");
                    not_shelved.push(name);
                    continue;
                }
            }
        }

        match ShelfValue::from_dynamic(&value) {
            Some(shelf_value) => bindings.push(ShelvedBinding {
                name,
                type_tag,
                value: shelf_value,
            }),
            None => not_shelved.push(name),
        }
    }

    let mut sources = Vec::new();
    for definition in definitions {
        let refused =
            refused_functions(definition.functions.iter().map(String::as_str), filter);
        if refused.is_empty() {
            sources.push(definition.source.clone());
        } else {
            not_shelved.extend(refused.into_iter().map(|name| format!("fn {name}")));
        }
    }

    let shelf = Shelf {
        version: SHELF_VERSION,
        bindings,
        definitions: sources,
    };
    (shelf, not_shelved)
}

/// Rebuilds an environment from a serialized [`Shelf`] on top of `base`.
///
/// * `engine`: compiles the shelved function definitions
/// * `blob`: the shelf as JSON
/// * `filter`: optional admission filter every binding and shelved function
///   must pass; host functions are never restored
/// * `base`: environment the shelved bindings and definitions are merged into
pub fn unshelve(
    engine: &Engine,
    blob: &str,
    filter: Option<&AdmissionFilter>,
    base: &Environment,
) -> Result<Environment, GradingError> {
    let reject = |reason: String| GradingError::ShelfDeserialization(reason);

    let shelf: Shelf =
        serde_json::from_str(blob).map_err(|e| reject(format!("malformed shelf: {e}")))?;
    if shelf.version != SHELF_VERSION {
        return Err(reject(format!("unsupported shelf version {}", shelf.version)));
    }

    let mut environment = base.clone();

    for definition in &shelf.definitions {
        let ast = engine
            .compile(definition)
            .map_err(|e| reject(format!("shelved definitions do not compile: {e}")))?;
        let refused = refused_functions(ast.iter_functions().map(|f| f.name), filter);
        if !refused.is_empty() {
            return Err(reject(format!(
                "shelved definitions define refused functions: {}",
                refused.join(", ")
            )));
        }
        environment.prelude.add_definitions(definition, &ast);
    }

    for binding in &shelf.bindings {
        if let Some(filter) = filter {
            match filter.admission(&binding.name, &binding.type_tag) {
                Admission::Admitted => {}
                Admission::Unlisted => {
                    return Err(reject(format!("`{}` is not an admitted variable", binding.name)));
                }
                Admission::WrongType(expected) => {
                    return Err(reject(format!(
                        "`{}` has type {} but {expected} is required",
                        binding.name, binding.type_tag
                    )));
                }
            }
        }

        let value = binding.value.to_dynamic()?;
        if value.type_name() != binding.type_tag {
            return Err(reject(format!(
                "`{}` is declared as {} but holds {}",
                binding.name,
                binding.type_tag,
                value.type_name()
            )));
        }
        environment.scope.push_dynamic(binding.name.clone(), value);
    }

    Ok(environment)
}
