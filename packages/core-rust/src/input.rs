//! Typed operation inputs and the capability interface that builds them.
//!
//! Operations declare their input type once at registration through an
//! [`InputType`]. Binders never inspect types at runtime; they call the
//! capability methods and receive an owned, type-erased [`TypedInput`]
//! that the invoker later downcasts back to the concrete request struct.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;

// ---------------------------------------------------------------------------
// TypedInput
// ---------------------------------------------------------------------------

/// An owned operation input whose concrete type was chosen by an [`InputType`].
pub struct TypedInput {
    type_name: &'static str,
    value: Box<dyn Any + Send>,
}

impl TypedInput {
    #[must_use]
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            value: Box::new(value),
        }
    }

    /// Name of the concrete type held.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Takes the concrete value out, or hands `self` back on a type mismatch.
    ///
    /// # Errors
    ///
    /// Returns the original `TypedInput` when it does not hold a `T`.
    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        let type_name = self.type_name;
        match self.value.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(value) => Err(Self { type_name, value }),
        }
    }
}

impl fmt::Debug for TypedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedInput")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// InputType
// ---------------------------------------------------------------------------

/// Factory for one operation input type.
pub trait InputType: Send + Sync {
    /// Human-readable name of the produced type, used in error messages.
    fn type_name(&self) -> &'static str;

    /// A default-valued instance: "no input supplied".
    fn create(&self) -> TypedInput;

    /// Builds an instance from decoded key/value pairs (query or form).
    ///
    /// # Errors
    ///
    /// Returns an error when a value cannot be converted to its field type.
    fn parse(&self, fields: &[(String, String)]) -> anyhow::Result<TypedInput>;

    /// Builds an instance from a format-neutral value tree produced by a
    /// body deserializer.
    ///
    /// # Errors
    ///
    /// Returns an error when the tree does not match the type's shape.
    fn from_value(&self, value: serde_json::Value) -> anyhow::Result<TypedInput>;
}

/// [`InputType`] for any `serde`-deserializable request struct with a default.
pub struct DtoType<T>(PhantomData<fn() -> T>);

impl<T> DtoType<T> {
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for DtoType<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InputType for DtoType<T>
where
    T: DeserializeOwned + Default + Send + 'static,
{
    fn type_name(&self) -> &'static str {
        short_type_name::<T>()
    }

    fn create(&self) -> TypedInput {
        TypedInput::new(T::default())
    }

    fn parse(&self, fields: &[(String, String)]) -> anyhow::Result<TypedInput> {
        // serde_urlencoded owns scalar coercion, so the pairs go back through it.
        let encoded = serde_urlencoded::to_string(fields)?;
        let value: T = serde_urlencoded::from_str(&encoded)?;
        Ok(TypedInput::new(value))
    }

    fn from_value(&self, value: serde_json::Value) -> anyhow::Result<TypedInput> {
        let value: T = serde_json::from_value(value)?;
        Ok(TypedInput::new(value))
    }
}

/// Last path segment of a type name, e.g. `GetUser` for `app::dto::GetUser`.
fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// ---------------------------------------------------------------------------
// OperationDescriptor
// ---------------------------------------------------------------------------

/// A registered operation: its public name and its input factory.
#[derive(Clone)]
pub struct OperationDescriptor {
    name: String,
    input: Arc<dyn InputType>,
}

impl OperationDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, input: Arc<dyn InputType>) -> Self {
        Self {
            name: name.into(),
            input,
        }
    }

    /// Descriptor whose input is the `serde` request struct `T`.
    #[must_use]
    pub fn for_dto<T>(name: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        Self::new(name, Arc::new(DtoType::<T>::new()))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn input(&self) -> &dyn InputType {
        self.input.as_ref()
    }
}

impl fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.name)
            .field("input", &self.input.type_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct GetUser {
        id: String,
        limit: u32,
        verbose: bool,
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn create_yields_default_instance() {
        let ty = DtoType::<GetUser>::new();
        let input = ty.create();
        assert_eq!(input.downcast_ref::<GetUser>(), Some(&GetUser::default()));
    }

    #[test]
    fn parse_converts_field_types() {
        let ty = DtoType::<GetUser>::new();
        let input = ty
            .parse(&pairs(&[("id", "42"), ("limit", "10"), ("verbose", "true")]))
            .unwrap();
        let dto = input.downcast::<GetUser>().unwrap();
        assert_eq!(
            dto,
            GetUser {
                id: "42".to_string(),
                limit: 10,
                verbose: true,
            }
        );
    }

    #[test]
    fn parse_rejects_bad_number() {
        let ty = DtoType::<GetUser>::new();
        assert!(ty.parse(&pairs(&[("limit", "ten")])).is_err());
    }

    #[test]
    fn parse_ignores_unknown_keys() {
        let ty = DtoType::<GetUser>::new();
        let input = ty.parse(&pairs(&[("id", "7"), ("debug", "")])).unwrap();
        assert_eq!(input.downcast_ref::<GetUser>().unwrap().id, "7");
    }

    #[test]
    fn from_value_builds_instance() {
        let ty = DtoType::<GetUser>::new();
        let input = ty
            .from_value(serde_json::json!({ "id": "7", "limit": 3 }))
            .unwrap();
        let dto = input.downcast_ref::<GetUser>().unwrap();
        assert_eq!(dto.id, "7");
        assert_eq!(dto.limit, 3);
    }

    #[test]
    fn downcast_mismatch_returns_input() {
        let input = TypedInput::new(5_u8);
        let input = input.downcast::<String>().unwrap_err();
        assert!(input.is::<u8>());
        assert_eq!(input.type_name(), "u8");
    }

    #[test]
    fn type_name_is_short() {
        assert_eq!(DtoType::<GetUser>::new().type_name(), "GetUser");
        let descriptor = OperationDescriptor::for_dto::<GetUser>("GetUser");
        assert_eq!(descriptor.name(), "GetUser");
        assert_eq!(descriptor.input().type_name(), "GetUser");
    }
}
