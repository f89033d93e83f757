use serde_json::Value;

use super::controller::FormInstance;
use super::path::FieldPath;

/// Array-valued field. Every edit writes a whole new array through
/// [`FormInstance::set_field_value`]; the list keeps no state of its own.
#[derive(Clone)]
pub struct FormList {
    form: FormInstance,
    path: FieldPath,
}

impl FormInstance {
    pub fn list(&self, path: impl Into<FieldPath>) -> FormList {
        FormList {
            form: self.clone(),
            path: path.into(),
        }
    }
}

impl FormList {
    pub fn path(&self) -> &FieldPath {
        &self.path
    }

    /// Current items; a missing or non-array value reads as empty.
    pub fn items(&self) -> Vec<Value> {
        match self.form.get_field_value(&self.path) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the item at `index`, for binding fields inside list rows.
    pub fn item_path(&self, index: usize) -> FieldPath {
        self.path.join(index)
    }

    pub fn add(&self, item: impl Into<Value>) {
        let mut items = self.items();
        items.push(item.into());
        self.write(items);
    }

    /// Inserts at `index`, clamped to the end of the list.
    pub fn insert(&self, index: usize, item: impl Into<Value>) {
        let mut items = self.items();
        let index = index.min(items.len());
        items.insert(index, item.into());
        self.write(items);
    }

    /// Removes the item at `index`; out-of-range indices leave the list unchanged.
    pub fn remove(&self, index: usize) {
        let items = self.items();
        if index >= items.len() {
            return;
        }
        let next = items
            .into_iter()
            .enumerate()
            .filter(|(position, _)| *position != index)
            .map(|(_, item)| item)
            .collect();
        self.write(next);
    }

    pub fn move_item(&self, from: usize, to: usize) {
        let mut items = self.items();
        if from >= items.len() || to >= items.len() || from == to {
            return;
        }
        let item = items.remove(from);
        items.insert(to, item);
        self.write(items);
    }

    fn write(&self, items: Vec<Value>) {
        self.form.set_field_value(&self.path, Value::Array(items));
    }
}
