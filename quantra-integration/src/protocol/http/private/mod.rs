use super::{BuildStrategy, rest::RestRequest};
use crate::error::SocketError;
use encoder::Encoder;
use hmac::Mac;

/// Encoders for turning raw signature bytes into the `String` form a venue expects.
pub mod encoder;

/// Venue-specific signing logic: what bytes to sign and how to attach the signature to the
/// outgoing request.
pub trait Signer {
    /// Signing material assembled from a [`RestRequest`] (timestamps, canonical query
    /// strings, body payloads, etc).
    type Config<'a>
    where
        Self: 'a;

    /// Assemble the signing material for the provided request.
    fn config<'a, Request>(
        &'a self,
        request: &Request,
        builder: &reqwest::RequestBuilder,
    ) -> Result<Self::Config<'a>, SocketError>
    where
        Request: RestRequest;

    /// Feed the canonical payload bytes into the [`Mac`] in venue-defined order.
    fn add_bytes_to_sign<M>(mac: &mut M, config: &Self::Config<'_>)
    where
        M: Mac;

    /// Attach the encoded signature (headers, query params, ...) and build the request.
    fn build_signed_request<'a>(
        config: Self::Config<'a>,
        builder: reqwest::RequestBuilder,
        signature: String,
    ) -> Result<reqwest::Request, SocketError>;
}

/// [`BuildStrategy`] that signs every [`RestRequest`] with a venue [`Signer`], a hashable
/// [`Mac`], and a signature [`Encoder`].
#[derive(Debug, Clone)]
pub struct RequestSigner<Sig, HmacMac, SignatureEncoder> {
    signer: Sig,
    mac: HmacMac,
    encoder: SignatureEncoder,
}

impl<Sig, HmacMac, SignatureEncoder> RequestSigner<Sig, HmacMac, SignatureEncoder>
where
    Sig: Signer,
    HmacMac: Mac + Clone,
    SignatureEncoder: Encoder,
{
    pub fn new(signer: Sig, mac: HmacMac, encoder: SignatureEncoder) -> Self {
        Self {
            signer,
            mac,
            encoder,
        }
    }
}

impl<Sig, HmacMac, SignatureEncoder> BuildStrategy for RequestSigner<Sig, HmacMac, SignatureEncoder>
where
    Sig: Signer,
    HmacMac: Mac + Clone,
    SignatureEncoder: Encoder,
{
    fn build<Request>(
        &self,
        request: &Request,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Request, SocketError>
    where
        Request: RestRequest,
    {
        let config = self.signer.config(request, &builder)?;

        let mut mac = self.mac.clone();
        Sig::add_bytes_to_sign(&mut mac, &config);
        let signature = self.encoder.encode(mac.finalize().into_bytes());

        Sig::build_signed_request(config, builder, signature)
    }
}
