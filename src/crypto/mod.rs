pub mod asn1;
pub mod cert;
pub mod cipher;
pub mod encoding;
pub mod hash;
pub mod params;
pub mod rsa_wrap;
pub mod sensitive;
