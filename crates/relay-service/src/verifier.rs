//! Groth16 proof verification (snarkjs-compatible, BN254)
//!
//! The verification key is parsed and prepared once at startup. It is fixed
//! for the lifetime of a deployment: proofs produced against one key do not
//! verify against another, so rotating it requires a migration plan.

use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ff::{One, PrimeField};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, VerifyingKey};
use ark_snark::SNARK;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Faults inside the verifier itself (never caused by client input)
#[derive(Error, Debug)]
pub enum VerifierFault {
    #[error("Malformed verification key: {0}")]
    MalformedKey(String),

    #[error("Failed to read verification key: {0}")]
    Io(#[from] std::io::Error),

    #[error("Verifier internal error: {0}")]
    Internal(String),
}

/// Checks an externally produced proof against its public signals
///
/// Returns `Ok(false)` for anything a client could have caused (malformed
/// proof, wrong signal count, non-canonical signals). `Err` is reserved for
/// verifier faults, which callers treat as configuration errors.
pub trait ProofVerifier: Send + Sync {
    fn verify(
        &self,
        proof: &serde_json::Value,
        public_signals: &[String],
    ) -> Result<bool, VerifierFault>;
}

/// snarkjs `proof.json`
#[derive(Debug, Deserialize)]
struct SnarkjsProof {
    pi_a: Vec<String>,
    pi_b: Vec<Vec<String>>,
    pi_c: Vec<String>,
    #[serde(default)]
    protocol: Option<String>,
}

/// snarkjs `verification_key.json`
#[derive(Debug, Deserialize)]
struct SnarkjsVerificationKey {
    protocol: String,
    curve: String,
    #[serde(rename = "nPublic")]
    n_public: usize,
    vk_alpha_1: Vec<String>,
    vk_beta_2: Vec<Vec<String>>,
    vk_gamma_2: Vec<Vec<String>>,
    vk_delta_2: Vec<Vec<String>>,
    #[serde(rename = "IC")]
    ic: Vec<Vec<String>>,
}

/// Groth16 verifier over BN254 with a prepared verification key
pub struct Groth16Verifier {
    pvk: PreparedVerifyingKey<Bn254>,
    n_public: usize,
}

impl Groth16Verifier {
    /// Parse a snarkjs verification key
    pub fn from_json(json: &str) -> Result<Self, VerifierFault> {
        let raw: SnarkjsVerificationKey =
            serde_json::from_str(json).map_err(|e| VerifierFault::MalformedKey(e.to_string()))?;

        if raw.protocol != "groth16" {
            return Err(VerifierFault::MalformedKey(format!(
                "unsupported protocol {:?}",
                raw.protocol
            )));
        }
        if raw.curve != "bn128" {
            return Err(VerifierFault::MalformedKey(format!(
                "unsupported curve {:?}",
                raw.curve
            )));
        }
        if raw.ic.len() != raw.n_public + 1 {
            return Err(VerifierFault::MalformedKey(format!(
                "IC has {} points, expected nPublic + 1 = {}",
                raw.ic.len(),
                raw.n_public + 1
            )));
        }

        let bad_point = |name: &str| VerifierFault::MalformedKey(format!("invalid point {}", name));

        let gamma_abc_g1 = raw
            .ic
            .iter()
            .enumerate()
            .map(|(i, p)| parse_g1(p).ok_or_else(|| bad_point(&format!("IC[{}]", i))))
            .collect::<Result<Vec<_>, _>>()?;

        let vk = VerifyingKey::<Bn254> {
            alpha_g1: parse_g1(&raw.vk_alpha_1).ok_or_else(|| bad_point("vk_alpha_1"))?,
            beta_g2: parse_g2(&raw.vk_beta_2).ok_or_else(|| bad_point("vk_beta_2"))?,
            gamma_g2: parse_g2(&raw.vk_gamma_2).ok_or_else(|| bad_point("vk_gamma_2"))?,
            delta_g2: parse_g2(&raw.vk_delta_2).ok_or_else(|| bad_point("vk_delta_2"))?,
            gamma_abc_g1,
        };

        let pvk = Groth16::<Bn254>::process_vk(&vk)
            .map_err(|e| VerifierFault::MalformedKey(e.to_string()))?;

        Ok(Self {
            pvk,
            n_public: raw.n_public,
        })
    }

    /// Load a snarkjs verification key from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, VerifierFault> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Number of public signals the circuit exposes
    pub fn public_signal_count(&self) -> usize {
        self.n_public
    }
}

impl ProofVerifier for Groth16Verifier {
    fn verify(
        &self,
        proof: &serde_json::Value,
        public_signals: &[String],
    ) -> Result<bool, VerifierFault> {
        if public_signals.len() != self.n_public {
            return Ok(false);
        }

        let Some(proof) = parse_proof(proof) else {
            return Ok(false);
        };

        let Some(inputs) = public_signals
            .iter()
            .map(|s| parse_canonical::<Fr>(s))
            .collect::<Option<Vec<_>>>()
        else {
            return Ok(false);
        };

        Groth16::<Bn254>::verify_with_processed_vk(&self.pvk, &inputs, &proof)
            .map_err(|e| VerifierFault::Internal(e.to_string()))
    }
}

fn parse_proof(value: &serde_json::Value) -> Option<Proof<Bn254>> {
    // Some clients send proof.json as a string
    let raw = match value {
        serde_json::Value::String(s) => serde_json::from_str::<SnarkjsProof>(s).ok()?,
        other => SnarkjsProof::deserialize(other).ok()?,
    };

    if raw.protocol.as_deref().is_some_and(|p| p != "groth16") {
        return None;
    }

    Some(Proof {
        a: parse_g1(&raw.pi_a)?,
        b: parse_g2(&raw.pi_b)?,
        c: parse_g1(&raw.pi_c)?,
    })
}

/// Decimal string to field element, rejecting values >= modulus
fn parse_canonical<F: PrimeField + FromStr>(s: &str) -> Option<F> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let stripped = s.trim_start_matches('0');
    let canonical = if stripped.is_empty() { "0" } else { stripped };

    let value = F::from_str(canonical).ok()?;
    (value.into_bigint().to_string() == canonical).then_some(value)
}

/// Projective `[x, y, z]` with z = 1 (z = 0 is the point at infinity)
fn parse_g1(coords: &[String]) -> Option<G1Affine> {
    let [x, y, z] = coords else {
        return None;
    };
    let z = parse_canonical::<Fq>(z)?;
    if !z.is_one() {
        return None;
    }

    let point = G1Affine::new_unchecked(parse_canonical(x)?, parse_canonical(y)?);
    (point.is_on_curve() && point.is_in_correct_subgroup_assuming_on_curve()).then_some(point)
}

/// Projective `[[x.c0, x.c1], [y.c0, y.c1], [z.c0, z.c1]]` with z = 1
fn parse_g2(coords: &[Vec<String>]) -> Option<G2Affine> {
    let [x, y, z] = coords else {
        return None;
    };
    let z = parse_fq2(z)?;
    if !z.is_one() {
        return None;
    }

    let point = G2Affine::new_unchecked(parse_fq2(x)?, parse_fq2(y)?);
    (point.is_on_curve() && point.is_in_correct_subgroup_assuming_on_curve()).then_some(point)
}

fn parse_fq2(pair: &[String]) -> Option<Fq2> {
    let [c0, c1] = pair else {
        return None;
    };
    Some(Fq2::new(parse_canonical(c0)?, parse_canonical(c1)?))
}
