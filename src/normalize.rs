/// Shared normalization between the canonical profile and the provider
/// adapters.
///
/// Every adapter renders its wire payload from the [`CanonicalProfile`]
/// produced here, so the cross-provider work happens exactly once per
/// submission:
/// 1. Derive person roles from the four boolean flags
/// 2. Decompose free-text phone numbers into calling code + national number
/// 3. Resolve country codes to both ISO widths
/// 4. Apply empty-string fallbacks for optional address parts
///
/// Provider quirks (date formats, field casing, required subsets) stay in
/// the adapters; anything two adapters would both need lives here.
use crate::models::{
    Address, BusinessType, Document, Person, ProfileModel, Role,
};
use chrono::NaiveDate;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use std::collections::BTreeSet;

/// Derive the role set for an associated person from the four boolean
/// flags. This is the single derivation point; adapters never rebuild it.
///
/// All-false maps to `{other}` so every person carries at least one role on
/// the wire.
pub fn derive_roles(
    has_ownership: bool,
    has_control: bool,
    is_signer: bool,
    is_director: bool,
) -> BTreeSet<Role> {
    let mut roles = BTreeSet::new();
    if has_ownership {
        roles.insert(Role::Owner);
    }
    if has_control {
        roles.insert(Role::Controller);
    }
    if is_signer {
        roles.insert(Role::Signer);
    }
    if is_director {
        roles.insert(Role::Director);
    }
    if roles.is_empty() {
        roles.insert(Role::Other);
    }
    roles
}

// ============ Dates ============

/// `2024-03-05` -> `"2024-03-05"` (ISO providers).
pub fn format_date_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `2024-03-05` -> `"05-03-2024"` (day-first providers).
pub fn format_date_dmy(date: NaiveDate) -> String {
    date.format("%d-%m-%Y").to_string()
}

// ============ Country Codes ============

/// Alpha-2 / alpha-3 pairs for the markets the intake form supports.
/// Providers disagree on code width, so the canonical address carries both.
const COUNTRY_CODES: &[(&str, &str)] = &[
    ("AE", "ARE"),
    ("AR", "ARG"),
    ("AT", "AUT"),
    ("AU", "AUS"),
    ("BE", "BEL"),
    ("BR", "BRA"),
    ("CA", "CAN"),
    ("CH", "CHE"),
    ("CL", "CHL"),
    ("CO", "COL"),
    ("DE", "DEU"),
    ("DK", "DNK"),
    ("ES", "ESP"),
    ("FI", "FIN"),
    ("FR", "FRA"),
    ("GB", "GBR"),
    ("HK", "HKG"),
    ("IE", "IRL"),
    ("IN", "IND"),
    ("IT", "ITA"),
    ("JP", "JPN"),
    ("MX", "MEX"),
    ("NL", "NLD"),
    ("NO", "NOR"),
    ("NZ", "NZL"),
    ("PL", "POL"),
    ("PT", "PRT"),
    ("SE", "SWE"),
    ("SG", "SGP"),
    ("US", "USA"),
    ("ZA", "ZAF"),
];

/// Resolve an ISO country code (either width) to alpha-2. Unknown codes
/// pass through uppercased so the provider's own validation reports them.
pub fn country_alpha2(code: &str) -> String {
    let upper = code.trim().to_ascii_uppercase();
    if upper.len() == 3 {
        if let Some((a2, _)) = COUNTRY_CODES.iter().find(|(_, a3)| *a3 == upper) {
            return (*a2).to_string();
        }
    }
    upper
}

/// Resolve an ISO country code (either width) to alpha-3. Unknown codes
/// pass through uppercased.
pub fn country_alpha3(code: &str) -> String {
    let upper = code.trim().to_ascii_uppercase();
    if upper.len() == 2 {
        if let Some((_, a3)) = COUNTRY_CODES.iter().find(|(a2, _)| *a2 == upper) {
            return (*a3).to_string();
        }
    }
    upper
}

// ============ Phones ============

/// Calling code + national number pair produced by the phonenumber parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneParts {
    pub calling_code: String,
    pub national_number: String,
    pub e164: String,
}

/// Region hint for national-format numbers. The parser only needs this when
/// the raw string lacks a `+` prefix.
fn region_hint(alpha2: &str) -> Option<CountryId> {
    match alpha2.trim().to_ascii_uppercase().as_str() {
        "US" => Some(CountryId::US),
        "CA" => Some(CountryId::CA),
        "GB" => Some(CountryId::GB),
        "IE" => Some(CountryId::IE),
        "DE" => Some(CountryId::DE),
        "FR" => Some(CountryId::FR),
        "ES" => Some(CountryId::ES),
        "IT" => Some(CountryId::IT),
        "PT" => Some(CountryId::PT),
        "NL" => Some(CountryId::NL),
        "BE" => Some(CountryId::BE),
        "AU" => Some(CountryId::AU),
        "NZ" => Some(CountryId::NZ),
        "BR" => Some(CountryId::BR),
        "MX" => Some(CountryId::MX),
        "SG" => Some(CountryId::SG),
        "IN" => Some(CountryId::IN),
        "ZA" => Some(CountryId::ZA),
        _ => None,
    }
}

/// Parse a free-text phone number into calling-code + national-number parts.
///
/// Uses the phonenumber library (libphonenumber port) rather than prefix
/// slicing: calling codes are 1-3 digits and cannot be split positionally.
/// Returns `None` for numbers the library rejects; providers that accept
/// free text get the raw string instead.
pub fn parse_phone(raw: &str, country: Option<&str>) -> Option<PhoneParts> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() < 7 {
        return None;
    }

    let hint = country.and_then(region_hint);
    let number = match phonenumber::parse(hint, trimmed) {
        Ok(number) => number,
        Err(e) => {
            tracing::debug!("Failed to parse phone '{}': {:?}", trimmed, e);
            return None;
        }
    };

    if !phonenumber::is_valid(&number) {
        tracing::debug!("Phone '{}' parsed but is not a valid number", trimmed);
        return None;
    }

    Some(PhoneParts {
        calling_code: number.code().value().to_string(),
        national_number: number.national().value().to_string(),
        e164: number.format().mode(Mode::E164).to_string(),
    })
}

// ============ Emails ============

/// Validate email address format (RFC 5322 simplified).
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    let email_regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    email_regex.is_match(email)
}

// ============ Canonical Intermediate ============

/// Address with fallbacks applied and both country code widths resolved.
#[derive(Debug, Clone, Default)]
pub struct CanonicalAddress {
    pub line1: String,
    pub line2: String,
    pub city: String,
    pub subdivision: String,
    pub postal_code: String,
    pub country_alpha2: String,
    pub country_alpha3: String,
}

/// Person with roles derived and phone decomposed.
#[derive(Debug, Clone)]
pub struct CanonicalPerson {
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub email: Option<String>,
    pub phone: Option<PhoneParts>,
    /// Raw phone text for providers that take it verbatim.
    pub phone_raw: Option<String>,
    pub nationality_alpha2: Option<String>,
    pub tax_id: Option<String>,
    pub residential_address: Option<CanonicalAddress>,
    pub ownership_percentage: Option<f64>,
    pub roles: BTreeSet<Role>,
    pub title: Option<String>,
}

impl CanonicalPerson {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Provider-agnostic intermediate built once per submission and shared
/// read-only by every adapter.
#[derive(Debug, Clone)]
pub struct CanonicalProfile {
    pub reference_id: String,
    pub legal_name: String,
    pub trade_name: Option<String>,
    pub description: Option<String>,
    pub email: Option<String>,
    pub business_type: BusinessType,
    pub tax_id: Option<String>,
    pub registration_number: Option<String>,
    pub incorporation_date: Option<NaiveDate>,
    pub industry_code: Option<String>,
    pub website: Option<String>,
    pub statement_descriptor: Option<String>,
    pub registered_address: CanonicalAddress,
    pub physical_address: Option<CanonicalAddress>,
    pub phone: Option<PhoneParts>,
    pub persons: Vec<CanonicalPerson>,
    pub documents: Vec<Document>,
}

fn canonicalize_address(address: &Address) -> CanonicalAddress {
    CanonicalAddress {
        line1: address.line1.trim().to_string(),
        line2: address.line2.clone().unwrap_or_default(),
        city: address.city.clone().unwrap_or_default(),
        subdivision: address.subdivision.clone().unwrap_or_default(),
        postal_code: address.postal_code.clone().unwrap_or_default(),
        country_alpha2: country_alpha2(&address.country),
        country_alpha3: country_alpha3(&address.country),
    }
}

fn canonicalize_person(person: &Person, default_country: &str) -> CanonicalPerson {
    // Prefer the person's own nationality as parse hint, then the business's
    // registered country.
    let phone_country = person
        .nationality
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(default_country)
        .to_string();

    CanonicalPerson {
        first_name: person.first_name.trim().to_string(),
        last_name: person.last_name.trim().to_string(),
        birth_date: person.birth_date,
        email: person.email.clone().filter(|e| !e.trim().is_empty()),
        phone: person
            .phone
            .as_deref()
            .and_then(|raw| parse_phone(raw, Some(phone_country.as_str()))),
        phone_raw: person.phone.clone().filter(|p| !p.trim().is_empty()),
        nationality_alpha2: person
            .nationality
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .map(country_alpha2),
        tax_id: person.tax_id.clone().filter(|t| !t.trim().is_empty()),
        residential_address: person.residential_address.as_ref().map(canonicalize_address),
        ownership_percentage: person.ownership_percentage,
        roles: derive_roles(
            person.has_ownership,
            person.has_control,
            person.is_signer,
            person.is_director,
        ),
        title: person.title.clone().filter(|t| !t.trim().is_empty()),
    }
}

/// Build the canonical intermediate for one submission attempt. Pure and
/// infallible: anything missing becomes an empty value and is caught by the
/// per-provider validation pass, not here.
pub fn canonicalize(profile: &ProfileModel) -> CanonicalProfile {
    let registered_address = canonicalize_address(&profile.registered_address);
    let default_country = registered_address.country_alpha2.clone();

    CanonicalProfile {
        reference_id: profile.reference_id.clone(),
        legal_name: profile.legal_name.trim().to_string(),
        trade_name: profile.trade_name.clone().filter(|t| !t.trim().is_empty()),
        description: profile.description.clone().filter(|d| !d.trim().is_empty()),
        email: profile.email.clone().filter(|e| !e.trim().is_empty()),
        business_type: profile.business_type,
        tax_id: profile.tax_id.clone().filter(|t| !t.trim().is_empty()),
        registration_number: profile
            .registration_number
            .clone()
            .filter(|r| !r.trim().is_empty()),
        incorporation_date: profile.incorporation_date,
        industry_code: profile
            .industry_code
            .clone()
            .filter(|i| !i.trim().is_empty()),
        website: profile.website.clone().filter(|w| !w.trim().is_empty()),
        statement_descriptor: profile
            .statement_descriptor
            .clone()
            .filter(|s| !s.trim().is_empty()),
        physical_address: profile.physical_address.as_ref().map(canonicalize_address),
        phone: profile.phone.as_ref().map(|p| {
            let calling_code = p.calling_code.trim_start_matches('+').to_string();
            let national_number: String =
                p.number.chars().filter(|c| c.is_ascii_digit()).collect();
            PhoneParts {
                e164: format!("+{}{}", calling_code, national_number),
                calling_code,
                national_number,
            }
        }),
        persons: profile
            .associated_persons
            .iter()
            .map(|p| canonicalize_person(p, &default_country))
            .collect(),
        documents: profile.documents.clone(),
        registered_address,
    }
}
