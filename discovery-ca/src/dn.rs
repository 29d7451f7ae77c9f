use std::fmt;

use yasna::models::ObjectIdentifier;
use yasna::tags::{TAG_BMPSTRING, TAG_TELETEXSTRING, TAG_UNIVERSALSTRING};
use yasna::DERWriter;

use crate::party_id::dotted;
use crate::{oid, Error};

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
#[non_exhaustive]
/// The attribute type of a distinguished name entry
pub enum DnType {
	/// X520countryName
	CountryName,
	/// X520LocalityName
	LocalityName,
	/// X520StateOrProvinceName
	StateOrProvinceName,
	/// X520OrganizationName
	OrganizationName,
	/// X520OrganizationalUnitName
	OrganizationalUnitName,
	/// X520CommonName
	CommonName,
	/// Custom distinguished name type
	CustomDnType(Vec<u64>),
}

impl DnType {
	pub(crate) fn to_oid(&self) -> ObjectIdentifier {
		let sl = match self {
			DnType::CountryName => oid::COUNTRY_NAME,
			DnType::LocalityName => oid::LOCALITY_NAME,
			DnType::StateOrProvinceName => oid::STATE_OR_PROVINCE_NAME,
			DnType::OrganizationName => oid::ORG_NAME,
			DnType::OrganizationalUnitName => oid::ORG_UNIT_NAME,
			DnType::CommonName => oid::COMMON_NAME,
			DnType::CustomDnType(ref oid) => oid.as_slice(),
		};
		ObjectIdentifier::from_slice(sl)
	}

	/// Generate a DnType for the provided OID
	pub fn from_oid(slice: &[u64]) -> Self {
		match slice {
			oid::COUNTRY_NAME => DnType::CountryName,
			oid::LOCALITY_NAME => DnType::LocalityName,
			oid::STATE_OR_PROVINCE_NAME => DnType::StateOrProvinceName,
			oid::ORG_NAME => DnType::OrganizationName,
			oid::ORG_UNIT_NAME => DnType::OrganizationalUnitName,
			oid::COMMON_NAME => DnType::CommonName,
			oid => DnType::CustomDnType(oid.into()),
		}
	}

	/// The short attribute name used in the string form, e.g. `CN`
	fn label(&self) -> String {
		match self {
			DnType::CountryName => "C".into(),
			DnType::LocalityName => "L".into(),
			DnType::StateOrProvinceName => "ST".into(),
			DnType::OrganizationName => "O".into(),
			DnType::OrganizationalUnitName => "OU".into(),
			DnType::CommonName => "CN".into(),
			DnType::CustomDnType(oid) => dotted(oid),
		}
	}
}

/// A distinguished name entry
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
#[non_exhaustive]
pub enum DnValue {
	/// A string encoded using UCS-2
	BmpString(Vec<u8>),
	/// An ASCII string.
	Ia5String(String),
	/// An ASCII string containing only A-Z, a-z, 0-9, '()+,-./:=? and `<SPACE>`
	PrintableString(String),
	/// A string of characters from the T.61 character set
	TeletexString(Vec<u8>),
	/// A string encoded using UTF-32
	UniversalString(Vec<u8>),
	/// A string encoded using UTF-8
	Utf8String(String),
}

impl DnValue {
	/// A PrintableString, failing for characters outside its character set
	pub fn printable(s: impl Into<String>) -> Result<Self, Error> {
		let s = s.into();
		let printable =
			|b: u8| b.is_ascii_alphanumeric() || b" '()+,-./:=?".contains(&b);
		match s.bytes().all(printable) {
			true => Ok(DnValue::PrintableString(s)),
			false => Err(Error::MalformedInput(format!(
				"{:?} is not a PrintableString",
				s
			))),
		}
	}

	/// The textual content, if the value is one of the string types we can render
	pub fn as_str(&self) -> Option<&str> {
		match self {
			DnValue::Ia5String(s) | DnValue::PrintableString(s) | DnValue::Utf8String(s) => {
				Some(s.as_str())
			},
			_ => None,
		}
	}
}

impl<T> From<T> for DnValue
where
	T: Into<String>,
{
	fn from(t: T) -> Self {
		DnValue::Utf8String(t.into())
	}
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
/**
Distinguished name used for the issuer and subject fields of a certificate

The name is a sequence of relative distinguished names (RDNs), each holding
one or more attributes. Both are kept in the order in which they are encoded,
so repeated attribute types and multi-valued RDNs survive unchanged.
*/
pub struct DistinguishedName {
	rdns: Vec<Vec<(DnType, DnValue)>>,
}

impl DistinguishedName {
	/// Creates a new, empty distinguished name
	pub fn new() -> Self {
		Self::default()
	}
	/// Obtains the first attribute value for the given attribute type
	pub fn get(&self, ty: &DnType) -> Option<&DnValue> {
		self.iter().find(|(t, _)| *t == ty).map(|(_, v)| v)
	}
	/// Appends an attribute that consists of type and name, as an RDN of its own
	///
	/// ```
	/// # use discovery_ca::{DistinguishedName, DnType, DnValue};
	/// let mut dn = DistinguishedName::new();
	/// dn.push(DnType::OrganizationName, "Crab widgits SE");
	/// dn.push(DnType::CommonName, DnValue::PrintableString("Master Cert".to_string()));
	/// assert_eq!(dn.get(&DnType::OrganizationName), Some(&DnValue::Utf8String("Crab widgits SE".to_string())));
	/// assert_eq!(dn.to_string(), "O=Crab widgits SE,CN=Master Cert");
	/// ```
	pub fn push(&mut self, ty: DnType, s: impl Into<DnValue>) {
		self.rdns.push(vec![(ty, s.into())]);
	}
	/// Appends a multi-valued RDN, empty sets are ignored
	pub fn push_multi(&mut self, attributes: Vec<(DnType, DnValue)>) {
		if !attributes.is_empty() {
			self.rdns.push(attributes);
		}
	}
	/// Iterate over the attributes of all RDNs, in order
	pub fn iter(&self) -> impl Iterator<Item = (&DnType, &DnValue)> + '_ {
		self.rdns.iter().flatten().map(|(ty, value)| (ty, value))
	}
	/// Iterate over the RDNs
	pub fn rdns(&self) -> impl Iterator<Item = &[(DnType, DnValue)]> + '_ {
		self.rdns.iter().map(Vec::as_slice)
	}
	/// Whether the name has no entries
	pub fn is_empty(&self) -> bool {
		self.rdns.is_empty()
	}

	/// Parses the string form produced by [`Display`](fmt::Display), e.g. `CN=test,O=test,C=NL`
	///
	/// RDNs are separated by `,` and the attributes of a multi-valued RDN by
	/// `+`. Special characters in values are escaped with a backslash as in
	/// RFC 4514. Values are stored as UTF8String, except the country which is
	/// a PrintableString.
	pub fn parse(s: &str) -> Result<Self, Error> {
		let mut dn = DistinguishedName::new();
		for rdn in split_unescaped(s, b',') {
			if rdn.trim().is_empty() {
				continue;
			}
			let attributes = split_unescaped(rdn, b'+')
				.into_iter()
				.map(parse_attribute)
				.collect::<Result<Vec<_>, _>>()?;
			dn.push_multi(attributes);
		}
		Ok(dn)
	}

	pub(crate) fn from_name(name: &x509_parser::x509::X509Name) -> Result<Self, Error> {
		use x509_parser::der_parser::asn1_rs::Tag;

		let malformed = || Error::MalformedInput("unsupported distinguished name".into());

		let mut dn = DistinguishedName::new();
		for rdn in name.iter() {
			let mut attributes = Vec::new();
			for attr in rdn.iter() {
				let attr_type_oid = attr.attr_type().iter().ok_or_else(malformed)?;
				let dn_type = DnType::from_oid(&attr_type_oid.collect::<Vec<_>>());
				let data = attr.attr_value().data;
				let try_str = |data| std::str::from_utf8(data).map_err(|_| malformed());
				let dn_value = match attr.attr_value().header.tag() {
					Tag::BmpString => DnValue::BmpString(data.into()),
					Tag::Ia5String => DnValue::Ia5String(try_str(data)?.to_owned()),
					Tag::PrintableString => DnValue::PrintableString(try_str(data)?.to_owned()),
					Tag::T61String => DnValue::TeletexString(data.into()),
					Tag::UniversalString => DnValue::UniversalString(data.into()),
					Tag::Utf8String => DnValue::Utf8String(try_str(data)?.to_owned()),
					_ => return Err(malformed()),
				};
				attributes.push((dn_type, dn_value));
			}
			// an RDN is a SET SIZE (1..MAX)
			if attributes.is_empty() {
				return Err(malformed());
			}
			dn.push_multi(attributes);
		}
		Ok(dn)
	}
}

fn parse_attribute(part: &str) -> Result<(DnType, DnValue), Error> {
	let (label, value) = part.split_once('=').ok_or_else(|| {
		Error::MalformedInput(format!("expected <type>=<value>, got {:?}", part.trim()))
	})?;
	let ty = match label.trim() {
		"C" => DnType::CountryName,
		"L" => DnType::LocalityName,
		"ST" => DnType::StateOrProvinceName,
		"O" => DnType::OrganizationName,
		"OU" => DnType::OrganizationalUnitName,
		"CN" => DnType::CommonName,
		other => {
			return Err(Error::MalformedInput(format!(
				"unsupported attribute type {}",
				other
			)))
		},
	};
	let value = value.trim_start();
	if value.starts_with('#') {
		return Err(Error::MalformedInput(format!(
			"hex encoded value of {} is not supported",
			label.trim()
		)));
	}
	let value = unescape(trim_unescaped_end(value))?;
	match ty {
		DnType::CountryName => Ok((ty, DnValue::printable(value)?)),
		_ => Ok((ty, value.into())),
	}
}

/// Splits at every `sep` that is not escaped by a backslash
fn split_unescaped(s: &str, sep: u8) -> Vec<&str> {
	let mut parts = Vec::new();
	let mut start = 0;
	let mut escaped = false;
	for (i, b) in s.bytes().enumerate() {
		match b {
			_ if escaped => escaped = false,
			b'\\' => escaped = true,
			b if b == sep => {
				parts.push(&s[start..i]);
				start = i + 1;
			},
			_ => {},
		}
	}
	parts.push(&s[start..]);
	parts
}

/// Trims trailing spaces, keeping one that is escaped
fn trim_unescaped_end(s: &str) -> &str {
	let bytes = s.as_bytes();
	let mut end = bytes.len();
	while end > 0 && bytes[end - 1] == b' ' && !(end > 1 && bytes[end - 2] == b'\\') {
		end -= 1;
	}
	&s[..end]
}

/// Resolves `\<char>` and `\<hex><hex>` escapes
fn unescape(s: &str) -> Result<String, Error> {
	let bytes = s.as_bytes();
	let mut out = Vec::with_capacity(bytes.len());
	let mut i = 0;
	while i < bytes.len() {
		if bytes[i] != b'\\' {
			out.push(bytes[i]);
			i += 1;
			continue;
		}
		let hex_pair = bytes
			.get(i + 1..i + 3)
			.filter(|pair| pair.iter().all(u8::is_ascii_hexdigit))
			.and_then(|pair| std::str::from_utf8(pair).ok())
			.and_then(|pair| u8::from_str_radix(pair, 16).ok());
		match (hex_pair, bytes.get(i + 1)) {
			(Some(byte), _) => {
				out.push(byte);
				i += 3;
			},
			(None, Some(&escaped)) => {
				out.push(escaped);
				i += 2;
			},
			(None, None) => {
				return Err(Error::MalformedInput(format!(
					"dangling escape in {:?}",
					s
				)))
			},
		}
	}
	String::from_utf8(out).map_err(|_| Error::MalformedInput(format!("invalid UTF-8 in {:?}", s)))
}

/// Writes `value` with the characters RFC 4514 reserves escaped
fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
	let last = value.chars().count().saturating_sub(1);
	for (i, c) in value.chars().enumerate() {
		match c {
			',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => write!(f, "\\{}", c)?,
			'#' if i == 0 => f.write_str("\\#")?,
			' ' if i == 0 || i == last => f.write_str("\\ ")?,
			'\0' => f.write_str("\\00")?,
			c => write!(f, "{}", c)?,
		}
	}
	Ok(())
}

impl fmt::Display for DistinguishedName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, rdn) in self.rdns().enumerate() {
			if i > 0 {
				f.write_str(",")?;
			}
			for (j, (ty, value)) in rdn.iter().enumerate() {
				if j > 0 {
					f.write_str("+")?;
				}
				write!(f, "{}=", ty.label())?;
				match value.as_str() {
					Some(s) => write_escaped(f, s)?,
					// hexstring of the encoded value
					None => {
						f.write_str("#")?;
						let der = yasna::construct_der(|writer| write_dn_value(writer, value));
						for byte in der {
							write!(f, "{:02x}", byte)?;
						}
					},
				}
			}
		}
		Ok(())
	}
}

fn write_dn_value(writer: DERWriter, value: &DnValue) {
	match value {
		DnValue::BmpString(s) => {
			writer.write_tagged_implicit(TAG_BMPSTRING, |writer| writer.write_bytes(s))
		},
		DnValue::Ia5String(s) => writer.write_ia5_string(s),
		DnValue::PrintableString(s) => writer.write_printable_string(s),
		DnValue::TeletexString(s) => {
			writer.write_tagged_implicit(TAG_TELETEXSTRING, |writer| writer.write_bytes(s))
		},
		DnValue::UniversalString(s) => {
			writer.write_tagged_implicit(TAG_UNIVERSALSTRING, |writer| writer.write_bytes(s))
		},
		DnValue::Utf8String(s) => writer.write_utf8_string(s),
	}
}

pub(crate) fn write_distinguished_name(writer: DERWriter, dn: &DistinguishedName) {
	writer.write_sequence(|writer| {
		for rdn in dn.rdns() {
			writer.next().write_set_of(|writer| {
				for (ty, content) in rdn {
					writer.next().write_sequence(|writer| {
						writer.next().write_oid(&ty.to_oid());
						write_dn_value(writer.next(), content);
					});
				}
			});
		}
	});
}

#[cfg(test)]
mod tests {
	use x509_parser::prelude::FromDer;

	use super::*;

	#[test]
	fn parse_display_roundtrip() {
		let dn = DistinguishedName::parse("CN=test,O=test,C=NL,L=town").unwrap();
		assert_eq!(dn.to_string(), "CN=test,O=test,C=NL,L=town");
		assert_eq!(
			dn.get(&DnType::CountryName),
			Some(&DnValue::PrintableString("NL".into()))
		);
	}

	#[test]
	fn parse_rejects_unknown_type() {
		assert!(DistinguishedName::parse("CN=a,X=b").is_err());
		assert!(DistinguishedName::parse("CN").is_err());
	}

	#[test]
	fn repeated_types_are_kept() {
		let dn = DistinguishedName::parse("CN=node, OU=a, OU=b").unwrap();
		assert_eq!(dn.to_string(), "CN=node,OU=a,OU=b");
		assert_eq!(
			dn.get(&DnType::OrganizationalUnitName),
			Some(&DnValue::Utf8String("a".into()))
		);
		assert_eq!(dn.iter().count(), 3);
	}

	#[test]
	fn multi_valued_rdn() {
		let dn = DistinguishedName::parse("CN=node+OU=ops,O=Org").unwrap();
		assert_eq!(dn.rdns().count(), 2);
		assert_eq!(dn.rdns().next().unwrap().len(), 2);
		assert_eq!(dn.to_string(), "CN=node+OU=ops,O=Org");
	}

	#[test]
	fn special_characters_are_escaped() {
		let mut dn = DistinguishedName::new();
		dn.push(DnType::CommonName, "a,b+c=d");
		dn.push(DnType::OrganizationName, " #lead\\trail ");
		let rendered = dn.to_string();
		assert_eq!(rendered, "CN=a\\,b\\+c\\=d,O=\\ #lead\\\\trail\\ ");
		assert_eq!(DistinguishedName::parse(&rendered).unwrap(), dn);

		let mut dn = DistinguishedName::new();
		dn.push(DnType::CommonName, "#1");
		assert_eq!(dn.to_string(), "CN=\\#1");
		assert_eq!(DistinguishedName::parse(&dn.to_string()).unwrap(), dn);
	}

	#[test]
	fn hex_escapes() {
		let dn = DistinguishedName::parse("CN=J\\c3\\b6rg").unwrap();
		assert_eq!(dn.get(&DnType::CommonName), Some(&DnValue::Utf8String("Jörg".into())));
		assert!(DistinguishedName::parse("CN=a\\").is_err());
		assert!(DistinguishedName::parse("CN=#0c0161").is_err());
	}

	#[test]
	fn country_is_printable() {
		assert!(DistinguishedName::parse("C=N_L").is_err());
		assert!(DnValue::printable("NL").is_ok());
	}

	#[test]
	fn binary_values_render_as_hex() {
		let mut dn = DistinguishedName::new();
		dn.push(DnType::CommonName, DnValue::BmpString(vec![0, b'a']));
		assert_eq!(dn.to_string(), "CN=#1e020061");
	}

	#[test]
	fn multi_valued_der_parses_back() {
		let dn = DistinguishedName::parse("C=NL,O=Org,OU=a,OU=b,CN=node+L=town").unwrap();
		let der = yasna::construct_der(|writer| write_distinguished_name(writer, &dn));
		let (_, name) = x509_parser::x509::X509Name::from_der(&der).unwrap();
		assert_eq!(name.iter().count(), 5);
		let parsed = DistinguishedName::from_name(&name).unwrap();
		assert_eq!(parsed.rdns().nth(4).unwrap().len(), 2);
		assert_eq!(parsed, dn);
		assert_eq!(parsed.to_string(), "C=NL,O=Org,OU=a,OU=b,CN=node+L=town");
	}

	#[test]
	fn der_parses_back() {
		let dn = DistinguishedName::parse("CN=test,O=test,C=NL,L=town").unwrap();
		let der = yasna::construct_der(|writer| write_distinguished_name(writer, &dn));
		let (_, name) = x509_parser::x509::X509Name::from_der(&der).unwrap();
		assert_eq!(DistinguishedName::from_name(&name).unwrap(), dn);
	}
}
