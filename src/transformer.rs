//! Reversible transforms between domain values and their stored form
//!
//! A [`Transformer`] must satisfy the round-trip law: for every `v`,
//! `untransform(transform(v)) == v`. [`AggregateTransformer`] chains two
//! transformers and keeps the law as long as both stages do.

use crate::error::{BoxError, PersistError};
use crate::storage::AnyValue;
use serde::{Serialize, de::DeserializeOwned};
use std::any::Any;
use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A stateless, bidirectional mapping between `Input` and `Output`
///
/// Implementations must be safe to call concurrently and must report
/// failures through `Error` instead of panicking.
pub trait Transformer: Send + Sync {
    /// The domain-side type
    type Input;
    /// The storage-side type
    type Output;
    /// Error returned by either direction
    type Error: Into<BoxError>;

    /// Convert a domain value into its stored form
    fn transform(&self, value: Self::Input) -> Result<Self::Output, Self::Error>;

    /// Convert a stored value back into its domain form
    fn untransform(&self, value: Self::Output) -> Result<Self::Input, Self::Error>;
}

/// Combinators available on every [`Transformer`]
pub trait TransformerExt: Transformer + Sized {
    /// Pipe the output of `self` into `next`
    ///
    /// # Example
    ///
    /// ```
    /// use persisted::{JsonTransformer, Transformer, TransformerExt, Utf8Transformer};
    ///
    /// let transformer = JsonTransformer::<Vec<u32>>::new().then(Utf8Transformer);
    /// let stored = transformer.transform(vec![1, 2]).unwrap();
    /// assert_eq!(stored, "[1,2]");
    /// ```
    fn then<Next>(self, next: Next) -> AggregateTransformer<Self, Next>
    where
        Next: Transformer<Input = Self::Output>,
    {
        AggregateTransformer::new(self, next)
    }
}

impl<T: Transformer> TransformerExt for T {}

/// Two transformers run back to back
///
/// `transform` runs `first` then `second`; `untransform` runs them in reverse.
/// The failing stage's error is returned as-is (boxed), so it can be
/// recovered with `downcast_ref`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateTransformer<First, Second> {
    first: First,
    second: Second,
}

impl<First, Second> AggregateTransformer<First, Second> {
    /// Chain `first` and `second`
    pub fn new(first: First, second: Second) -> Self {
        Self { first, second }
    }

    /// Split the chain back into its stages
    pub fn into_inner(self) -> (First, Second) {
        (self.first, self.second)
    }
}

impl<First, Second> Transformer for AggregateTransformer<First, Second>
where
    First: Transformer,
    Second: Transformer<Input = First::Output>,
{
    type Input = First::Input;
    type Output = Second::Output;
    type Error = BoxError;

    fn transform(&self, value: Self::Input) -> Result<Self::Output, Self::Error> {
        let intermediate = self.first.transform(value).map_err(Into::into)?;
        self.second.transform(intermediate).map_err(Into::into)
    }

    fn untransform(&self, value: Self::Output) -> Result<Self::Input, Self::Error> {
        let intermediate = self.second.untransform(value).map_err(Into::into)?;
        self.first.untransform(intermediate).map_err(Into::into)
    }
}

/// Passes values through unchanged
pub struct Identity<V>(PhantomData<fn(V) -> V>);

impl<V> Identity<V> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<V> Default for Identity<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for Identity<V> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for Identity<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity<{}>", std::any::type_name::<V>())
    }
}

impl<V> Transformer for Identity<V> {
    type Input = V;
    type Output = V;
    type Error = Infallible;

    fn transform(&self, value: V) -> Result<V, Infallible> {
        Ok(value)
    }

    fn untransform(&self, value: V) -> Result<V, Infallible> {
        Ok(value)
    }
}

/// Boxes a value as [`AnyValue`] and downcasts it back
///
/// This is the single place where the type-erased storage path checks the
/// runtime type; a mismatch is reported as
/// [`PersistError::UnexpectedValueType`].
pub struct Downcast<V>(PhantomData<fn(V) -> V>);

impl<V> Downcast<V> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<V> Default for Downcast<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Clone for Downcast<V> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for Downcast<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Downcast<{}>", std::any::type_name::<V>())
    }
}

impl<V> Transformer for Downcast<V>
where
    V: Any + Clone + Send + Sync,
{
    type Input = V;
    type Output = AnyValue;
    type Error = PersistError;

    fn transform(&self, value: V) -> Result<AnyValue, PersistError> {
        Ok(Arc::new(value))
    }

    fn untransform(&self, value: AnyValue) -> Result<V, PersistError> {
        value
            .downcast::<V>()
            .map(|value| Arc::try_unwrap(value).unwrap_or_else(|shared| (*shared).clone()))
            .map_err(PersistError::unexpected_value_type::<V>)
    }
}

/// Encodes values as JSON bytes
pub struct JsonTransformer<T>(PhantomData<fn(T) -> T>);

impl<T> JsonTransformer<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonTransformer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonTransformer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonTransformer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonTransformer<{}>", std::any::type_name::<T>())
    }
}

impl<T> Transformer for JsonTransformer<T>
where
    T: Serialize + DeserializeOwned,
{
    type Input = T;
    type Output = Vec<u8>;
    type Error = serde_json::Error;

    fn transform(&self, value: T) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&value)
    }

    fn untransform(&self, value: Vec<u8>) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&value)
    }
}

/// Maps values to and from a [`serde_json::Value`] tree
///
/// A JSON value that cannot be read as `T` is an unexpected value type
/// rather than a decoding failure, since the stored data is already JSON.
pub struct JsonValueTransformer<T>(PhantomData<fn(T) -> T>);

impl<T> JsonValueTransformer<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonValueTransformer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonValueTransformer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonValueTransformer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonValueTransformer<{}>", std::any::type_name::<T>())
    }
}

impl<T> Transformer for JsonValueTransformer<T>
where
    T: Serialize + DeserializeOwned,
{
    type Input = T;
    type Output = serde_json::Value;
    type Error = PersistError;

    fn transform(&self, value: T) -> Result<serde_json::Value, PersistError> {
        serde_json::to_value(value).map_err(PersistError::transform)
    }

    fn untransform(&self, value: serde_json::Value) -> Result<T, PersistError> {
        T::deserialize(&value).map_err(|e| {
            log::debug!("JSON value does not match {}: {e}", std::any::type_name::<T>());
            PersistError::unexpected_value_type::<T>(&value)
        })
    }
}

/// Converts UTF-8 bytes to a `String` and back
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8Transformer;

impl Transformer for Utf8Transformer {
    type Input = Vec<u8>;
    type Output = String;
    type Error = std::string::FromUtf8Error;

    fn transform(&self, value: Vec<u8>) -> Result<String, Self::Error> {
        String::from_utf8(value)
    }

    fn untransform(&self, value: String) -> Result<Vec<u8>, Self::Error> {
        Ok(value.into_bytes())
    }
}
