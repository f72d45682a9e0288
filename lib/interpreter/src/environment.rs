use std::{cell::RefCell, collections::HashMap, rc::Rc};

use crate::value::Value;

/// One lexical scope. A child frame keeps its enclosing frame alive for as long as the
/// child exists, which is at most the duration of the block that created it.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, Value>,
    enclosing: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn global() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn new_enclosed(enclosing: &Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self { values: HashMap::new(), enclosing: Some(enclosing.clone()) }))
    }

    /// Binds `name` in this frame, replacing any previous binding of the same frame.
    pub fn define(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        match self.values.get(name) {
            Some(value) => Some(value.clone()),
            None => self.enclosing.as_ref()?.borrow().get(name),
        }
    }

    /// Rebinds `name` in the innermost frame that defines it. Returns `false` if no frame
    /// on the chain does; no binding is created in that case.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        match self.values.get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => match &self.enclosing {
                Some(enclosing) => enclosing.borrow_mut().assign(name, value),
                None => false,
            },
        }
    }
}
