/// A struct whose named fields are top-level form paths.
///
/// Derive it with `#[derive(FormModel)]` to get a `{Model}Fields` accessor whose methods
/// return each field's [`FieldPath`](super::FieldPath), honouring `#[serde(rename)]`.
pub trait FormModel {
    type Fields;

    fn fields() -> Self::Fields;
}
