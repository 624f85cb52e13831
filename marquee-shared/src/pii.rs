use serde::{Serialize, Deserialize, Serializer};
use std::fmt;

/// Keeps user identifiers out of log lines. Debug and Display show only the last
/// four characters; serialization still carries the real value.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Masked<T>(pub T);

impl<T: AsRef<str>> Masked<T> {
    fn redacted(&self) -> String {
        let value = self.0.as_ref();
        let tail: String = value.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
        if value.chars().count() <= 4 {
            "****".to_string()
        } else {
            format!("****{}", tail)
        }
    }
}

impl<T: AsRef<str>> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<T: AsRef<str>> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<'a> From<&'a str> for Masked<&'a str> {
    fn from(value: &'a str) -> Self {
        Masked(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_all_but_tail() {
        assert_eq!(Masked("user-12345").to_string(), "****2345");
        assert_eq!(format!("{:?}", Masked("abc")), "****");
        assert_eq!(Masked("user-12345".to_string()).into_inner(), "user-12345");
    }
}
