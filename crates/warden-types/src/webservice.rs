/// Policy-level identity of an authenticator endpoint.
///
/// A webservice is addressed as `{account}:webservice:conjur/{name}` where
/// `name` is the authenticator type optionally followed by a service id.
/// The resource id is a pure function of the three fields and is used as
/// the lookup key into the resource store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Webservice {
    /// Organization account owning the webservice
    pub account: String,
    /// Authenticator type, e.g. `authn-azure`
    pub authenticator_name: String,
    /// Optional service id for multi-instance authenticators
    pub service_id: Option<String>,
}

impl Webservice {
    /// Creates a webservice identity.
    pub fn new(
        account: impl Into<String>,
        authenticator_name: impl Into<String>,
        service_id: Option<String>,
    ) -> Self {
        Self { account: account.into(), authenticator_name: authenticator_name.into(), service_id }
    }

    /// Parses `"authn-x"` or `"authn-x/service"` into a webservice.
    pub fn from_string(account: impl Into<String>, name: &str) -> Self {
        match name.split_once('/') {
            Some((authenticator, service)) => {
                Self::new(account, authenticator, Some(service.to_string()))
            },
            None => Self::new(account, name, None),
        }
    }

    /// `authenticator_name` optionally joined with `service_id`.
    pub fn name(&self) -> String {
        match &self.service_id {
            Some(service_id) => format!("{}/{}", self.authenticator_name, service_id),
            None => self.authenticator_name.clone(),
        }
    }

    /// Deterministic resource id of this webservice.
    pub fn resource_id(&self) -> String {
        format!("{}:webservice:conjur/{}", self.account, self.name())
    }

    /// Resource id of the derived status sub-resource, used by the
    /// authenticator status endpoint.
    pub fn status_resource_id(&self) -> String {
        format!("{}/status", self.resource_id())
    }
}

/// Ordered set of webservices parsed from the enabled-authenticators list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Webservices {
    entries: Vec<Webservice>,
}

impl Webservices {
    /// Parses a comma-separated whitelist such as
    /// `"authn,authn-jwt/raw,authn-azure/prod"`.
    ///
    /// A missing or empty list yields the empty set, not an error.
    pub fn from_string(account: impl Into<String>, csv: Option<&str>) -> Self {
        let account = account.into();
        let entries = csv
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| Webservice::from_string(account.clone(), entry))
            .collect();
        Self { entries }
    }

    /// Whether the given webservice is in the enabled set.
    pub fn contains(&self, webservice: &Webservice) -> bool {
        self.entries.iter().any(|entry| entry.name() == webservice.name())
    }

    /// Number of enabled webservices.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the enabled webservices in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Webservice> {
        self.entries.iter()
    }
}
