#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! The state a submission builds up as its cells run.

use rhai::{AST, Dynamic, Engine, ParseError, Scope};

use crate::{constants::HOST_FUNCTIONS, grade::CheckRunner};

/// Returns true if `name` is a host function that script definitions may not
/// replace.
pub fn is_host_function(name: &str) -> bool {
    HOST_FUNCTIONS.contains(&name)
}

/// A unit that defined script functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// The unit's source.
    pub source:    String,
    /// Every function name the unit defines, including refused ones.
    pub functions: Vec<String>,
}

/// Everything that must be re-applied before each unit so that cells behave
/// like one sequential program.
#[derive(Debug, Clone, Default)]
pub struct Prelude {
    /// Import statements seen so far, in first-seen order.
    pub imports:     Vec<String>,
    /// Units that defined script functions.
    pub definitions: Vec<Definition>,
    /// Every script function defined so far.
    pub library:     AST,
}

impl Prelude {
    /// Records an import statement unless it is already known.
    pub fn add_import(&mut self, statement: &str) {
        if !self.imports.iter().any(|known| known == statement) {
            self.imports.push(statement.to_string());
        }
    }

    /// Adds the functions defined in `ast` to the library. Definitions that
    /// would replace a host function are left out of the library. Returns
    /// false and records nothing when `ast` defines no functions.
    ///
    /// * `source`: the unit source `ast` was compiled from
    /// * `ast`: the compiled unit
    pub fn add_definitions(&mut self, source: &str, ast: &AST) -> bool {
        let mut functions: Vec<String> = Vec::new();
        for function in ast.iter_functions() {
            if is_host_function(function.name) {
                tracing::warn!("Ignoring script definition of host function `{}`", function.name);
            }
            if !functions.iter().any(|known| known == function.name) {
                functions.push(function.name.to_string());
            }
        }
        if functions.is_empty() {
            return false;
        }

        self.library
            .combine(ast.clone_functions_only_filtered(|_, _, _, name, _| !is_host_function(name)));
        self.definitions.push(Definition {
            source: source.to_string(),
            functions,
        });
        true
    }

    /// `source` preceded by the known imports.
    pub fn with_imports(&self, source: &str) -> String {
        format!("{}\n{source}", self.imports.join("\n"))
    }

    /// Compiles `source` behind the known imports and merges in the library.
    pub fn compile(&self, engine: &Engine, source: &str) -> Result<AST, ParseError> {
        let ast = engine.compile(self.with_imports(source))?;
        Ok(self.library.merge(&ast))
    }
}

/// Variable bindings plus the prelude.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    /// Live variables.
    pub scope:   Scope<'static>,
    /// Imports and function definitions.
    pub prelude: Prelude,
}

impl Environment {
    /// The current value of a variable.
    pub fn get(&self, name: &str) -> Option<Dynamic> {
        self.scope.get_value::<Dynamic>(name)
    }

    /// Returns true if a variable called `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.scope.contains(name)
    }
}

/// Runs test case bodies against a snapshot of an environment. Each body
/// sees its own copy of the scope.
pub struct ScriptContext<'a, 's> {
    /// Engine to evaluate with.
    engine:  &'a Engine,
    /// Variables visible to the checks.
    scope:   &'a Scope<'s>,
    /// Imports and functions visible to the checks.
    prelude: &'a Prelude,
}

impl<'a, 's> ScriptContext<'a, 's> {
    /// Wraps the pieces of an environment.
    pub fn new(engine: &'a Engine, scope: &'a Scope<'s>, prelude: &'a Prelude) -> Self {
        Self {
            engine,
            scope,
            prelude,
        }
    }
}

impl<'a> ScriptContext<'a, 'static> {
    /// Wraps a whole [`Environment`].
    pub fn for_environment(engine: &'a Engine, environment: &'a Environment) -> Self {
        Self::new(engine, &environment.scope, &environment.prelude)
    }
}

impl CheckRunner for ScriptContext<'_, '_> {
    fn run_check(&self, body: &str) -> Result<(), String> {
        let ast = self
            .prelude
            .compile(self.engine, body)
            .map_err(|e| format!("Test case does not compile: {e}"))?;
        let mut scope = self.scope.clone();

        let value = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|e| e.to_string())?;

        if value.is_unit() {
            return Ok(());
        }
        match value.as_bool() {
            Ok(true) => Ok(()),
            Ok(false) => Err("Test case evaluated to false".to_string()),
            Err(_) => Err(format!(
                "Test case evaluated to a value of type {} instead of a boolean",
                value.type_name()
            )),
        }
    }
}
