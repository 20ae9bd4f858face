/// A single key/value constraint extracted from a role's annotations.
///
/// The name is the annotation suffix after the authenticator prefix, e.g.
/// `subscription-id` for the annotation `authn-azure/subscription-id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRestriction {
    /// Restriction name (annotation suffix)
    pub name: String,
    /// Restriction value as written in the annotation
    pub value: String,
}

impl ResourceRestriction {
    /// Creates a restriction.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// Ordered list of resource restrictions, as extracted from annotations.
///
/// Extraction preserves duplicates; deduplication and combination rules are
/// the constraint engine's concern, not the data type's.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRestrictions {
    entries: Vec<ResourceRestriction>,
}

impl ResourceRestrictions {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a restriction.
    pub fn push(&mut self, restriction: ResourceRestriction) {
        self.entries.push(restriction);
    }

    /// Restriction names in extraction order.
    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|r| r.name.clone()).collect()
    }

    /// Looks up the value of the first restriction with the given name.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|r| r.name == name).map(|r| r.value.as_str())
    }

    /// Number of restrictions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the restrictions in extraction order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceRestriction> {
        self.entries.iter()
    }
}

impl FromIterator<ResourceRestriction> for ResourceRestrictions {
    fn from_iter<T: IntoIterator<Item = ResourceRestriction>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}
