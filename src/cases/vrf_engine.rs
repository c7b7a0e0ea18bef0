use crate::cases::random::{DrawContext, RandomSource, Roll};
use crate::cases::types::VRFBundle;
use schnorrkel::context::SigningContext;
use schnorrkel::vrf::{VRFInOut, VRFPreOut, VRFProof};
use schnorrkel::{Keypair, PublicKey, SecretKey};
use std::sync::Arc;

const VRF_SIGNING_CONTEXT: &[u8] = b"lootcase-draw";
const VRF_OUTPUT_CONTEXT: &[u8] = b"lootcase-roll";

/// Verifiable random source.
///
/// Each roll evaluates a schnorrkel VRF over the draw context with the house
/// key. The output is unique for a given key and input, and anyone holding
/// the public key can check the proof and recompute the roll.
pub struct VrfRandomSource {
    keypair: Arc<Keypair>,
}

impl VrfRandomSource {
    /// Create a new VRF source with a keypair
    pub fn new(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Create a new VRF source with a random keypair
    pub fn new_random() -> Self {
        use rand_core::OsRng;
        let keypair = Keypair::generate_with(OsRng);
        Self::new(keypair)
    }

    /// Restore from a hex-encoded 64-byte secret key
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, String> {
        let bytes =
            hex::decode(secret_hex.trim()).map_err(|e| format!("Invalid secret key hex: {}", e))?;
        let secret = SecretKey::from_bytes(&bytes)
            .map_err(|e| format!("Invalid secret key: {:?}", e))?;
        Ok(Self::new(secret.to_keypair()))
    }

    /// Evaluate the VRF on `input_message` and package output, proof and
    /// public key
    pub fn generate_outcome(&self, input_message: &str) -> VRFBundle {
        let (inout, proof) = self.vrf_sign(input_message.as_bytes());
        self.bundle(input_message.to_string(), &inout, &proof)
    }

    fn vrf_sign(&self, message: &[u8]) -> (VRFInOut, VRFProof) {
        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let (inout, proof, _) = self.keypair.vrf_sign(ctx.bytes(message));
        (inout, proof)
    }

    fn output_bytes(inout: &VRFInOut) -> [u8; 32] {
        inout.make_bytes::<[u8; 32]>(VRF_OUTPUT_CONTEXT)
    }

    fn bundle(&self, input_message: String, inout: &VRFInOut, proof: &VRFProof) -> VRFBundle {
        VRFBundle {
            vrf_output: hex::encode(Self::output_bytes(inout)),
            vrf_preout: hex::encode(inout.to_preout().to_bytes()),
            vrf_proof: hex::encode(proof.to_bytes()),
            public_key: self.public_key_hex(),
            input_message,
        }
    }

    /// Map a VRF output onto `[0, bound)`.
    ///
    /// Uses the first 16 bytes as a big-endian integer, so the modulo bias is
    /// at most `bound / 2^128`.
    pub fn roll_from_output(vrf_output: &[u8], bound: u64) -> u64 {
        let mut head = [0u8; 16];
        let take = vrf_output.len().min(16);
        head[..take].copy_from_slice(&vrf_output[..take]);
        (u128::from_be_bytes(head) % u128::from(bound)) as u64
    }

    /// Verify a VRF proof (public verification function).
    ///
    /// Checks the DLEQ proof of the pre-output against the public key and
    /// input, then recomputes the output from the verified pre-output.
    pub fn verify_vrf_proof(vrf_bundle: &VRFBundle, expected_input: &str) -> Result<bool, String> {
        if vrf_bundle.input_message != expected_input {
            return Ok(false);
        }

        let vrf_output = hex::decode(&vrf_bundle.vrf_output)
            .map_err(|e| format!("Invalid VRF output hex: {}", e))?;
        let preout_bytes = hex::decode(&vrf_bundle.vrf_preout)
            .map_err(|e| format!("Invalid VRF pre-output hex: {}", e))?;
        let proof_bytes = hex::decode(&vrf_bundle.vrf_proof)
            .map_err(|e| format!("Invalid VRF proof hex: {}", e))?;
        let public_key_bytes = hex::decode(&vrf_bundle.public_key)
            .map_err(|e| format!("Invalid public key hex: {}", e))?;

        let public_key = PublicKey::from_bytes(&public_key_bytes)
            .map_err(|e| format!("Invalid public key: {:?}", e))?;
        let preout = VRFPreOut::from_bytes(&preout_bytes)
            .map_err(|e| format!("Invalid VRF pre-output: {:?}", e))?;
        let proof = VRFProof::from_bytes(&proof_bytes)
            .map_err(|e| format!("Invalid VRF proof: {:?}", e))?;

        let ctx = SigningContext::new(VRF_SIGNING_CONTEXT);
        let inout = match public_key.vrf_verify(ctx.bytes(expected_input.as_bytes()), &preout, &proof)
        {
            Ok((inout, _)) => inout,
            Err(_) => return Ok(false),
        };

        Ok(Self::output_bytes(&inout).as_slice() == vrf_output.as_slice())
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.keypair.public.to_bytes().to_vec()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key())
    }
}

impl RandomSource for VrfRandomSource {
    fn roll(&self, bound: u64, context: &DrawContext) -> Roll {
        let input_message = context.to_string();
        let (inout, proof) = self.vrf_sign(input_message.as_bytes());
        let value = Self::roll_from_output(&Self::output_bytes(&inout), bound);

        Roll {
            value,
            proof: Some(self.bundle(input_message, &inout, &proof)),
        }
    }

    fn name(&self) -> &'static str {
        "vrf"
    }
}
