//  Copyright 2024 Ring Cache Authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

use std::fmt;

use bytes::Bytes;

/// An immutable, cheaply-cloneable view over a cached value's bytes.
///
/// Cloning a [`ByteView`] bumps a refcount rather than copying the backing
/// buffer. Callers that need an owned, independent buffer (e.g. handing bytes
/// across the RPC boundary) should use [`ByteView::to_vec`], which performs
/// the defensive copy the original design always made at every hand-off.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ByteView(Bytes);

impl ByteView {
    /// Length of the view in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the view as a byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Defensive copy of the view's bytes.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<Bytes> for ByteView {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for ByteView {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

impl From<String> for ByteView {
    fn from(s: String) -> Self {
        Self(Bytes::from(s.into_bytes()))
    }
}

impl From<&str> for ByteView {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl fmt::Display for ByteView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Cost, in bytes, of storing `key` paired with `value`: `len(key) + value.len()`.
pub fn entry_cost(key: &str, value: &ByteView) -> usize {
    key.len() + value.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_is_cheap_and_equal() {
        let a = ByteView::from(b"hello".as_slice());
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn cost_accounts_for_key_and_value() {
        let v = ByteView::from(b"123456789".as_slice());
        assert_eq!(entry_cost("k", &v), 1 + 9);
    }
}
