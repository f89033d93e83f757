pub use crate::form::{
    FieldHandle, FieldMeta, FieldOptions, FieldPath, FieldWatch, FormInstance, FormList,
    FormModel, FormOptions, Rule, RuleFault, ValidateError, ValidateTrigger, WatchOptions,
    WatchSource,
};
