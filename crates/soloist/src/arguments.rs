//! # Call Arguments
//!
//! Positional and keyword arguments of one call. The same shape is used for
//! application values (`Arguments<serde_json::Value>`) and for their
//! serialized form on the wire (`Arguments<Vec<u8>>`).

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::serializer::SerializationError;

#[derive(Debug, Clone, PartialEq)]
pub struct Arguments<V> {
    pub positional: Vec<V>,
    pub keyword: BTreeMap<String, V>,
}

impl<V> Default for Arguments<V> {
    fn default() -> Self {
        Self { positional: Vec::new(), keyword: BTreeMap::new() }
    }
}

impl<V> Arguments<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds arguments from positional values only.
    pub fn positional(values: impl IntoIterator<Item = V>) -> Self {
        Self { positional: values.into_iter().collect(), keyword: BTreeMap::new() }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: V) -> Self {
        self.positional.push(value);
        self
    }

    /// Sets a keyword argument, replacing any previous value under `name`.
    pub fn kwarg(mut self, name: impl Into<String>, value: V) -> Self {
        self.keyword.insert(name.into(), value);
        self
    }

    pub fn get(&self, index: usize) -> Option<&V> {
        self.positional.get(index)
    }

    pub fn get_kw(&self, name: &str) -> Option<&V> {
        self.keyword.get(name)
    }

    /// Total number of arguments, positional and keyword.
    pub fn len(&self) -> usize {
        self.positional.len() + self.keyword.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    /// Converts every argument, stopping at the first failure.
    pub fn try_map<U, E, F>(self, mut f: F) -> Result<Arguments<U>, E>
    where
        F: FnMut(V) -> Result<U, E>,
    {
        let positional = self.positional.into_iter().map(&mut f).collect::<Result<_, _>>()?;
        let mut keyword = BTreeMap::new();
        for (name, value) in self.keyword {
            keyword.insert(name, f(value)?);
        }
        Ok(Arguments { positional, keyword })
    }

    /// Like `try_map`, borrowing the values.
    pub fn try_map_ref<U, E, F>(&self, mut f: F) -> Result<Arguments<U>, E>
    where
        F: FnMut(&V) -> Result<U, E>,
    {
        let positional = self.positional.iter().map(&mut f).collect::<Result<_, _>>()?;
        let mut keyword = BTreeMap::new();
        for (name, value) in &self.keyword {
            keyword.insert(name.clone(), f(value)?);
        }
        Ok(Arguments { positional, keyword })
    }
}

// Typed access for JSON-valued arguments.
impl Arguments<serde_json::Value> {
    /// Appends any serde-serializable value as a positional argument.
    pub fn push<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), SerializationError> {
        self.positional.push(to_value(value)?);
        Ok(())
    }

    /// Sets any serde-serializable value as a keyword argument.
    pub fn insert<T: Serialize + ?Sized>(&mut self, name: impl Into<String>, value: &T) -> Result<(), SerializationError> {
        self.keyword.insert(name.into(), to_value(value)?);
        Ok(())
    }

    /// Reads positional argument `index` as `T`.
    pub fn typed<T: DeserializeOwned>(&self, index: usize) -> Result<T, SerializationError> {
        let value = self.positional.get(index)
            .ok_or_else(|| SerializationError::MissingArgument(format!("#{}", index)))?;
        from_value(value)
    }

    /// Reads keyword argument `name` as `T`.
    pub fn typed_kw<T: DeserializeOwned>(&self, name: &str) -> Result<T, SerializationError> {
        let value = self.keyword.get(name)
            .ok_or_else(|| SerializationError::MissingArgument(name.to_string()))?;
        from_value(value)
    }

    /// Reads keyword argument `name` as `T`, or `None` if it was not passed.
    pub fn typed_kw_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, SerializationError> {
        self.keyword.get(name).map(from_value).transpose()
    }
}

/// Converts a serde-serializable value into a JSON value.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value, SerializationError> {
    serde_json::to_value(value).map_err(|e| SerializationError::Encode(e.to_string()))
}

/// Converts a JSON value into any deserializable type.
pub fn from_value<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T, SerializationError> {
    T::deserialize(value).map_err(|e| SerializationError::Decode(e.to_string()))
}
