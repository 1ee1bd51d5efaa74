// XML-API add-on client
//
// The CCU's XML-API add-on serves the device inventory at
// `/addons/xmlapi/devicelist.cgi`. Newer add-on versions require a session
// token passed as `sid`.

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;
use crate::xml::{self, Element};

/// One `<device>` of the device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceListEntry {
    pub name: String,
    /// Device serial, e.g. `"LEQ0123456"`.
    pub address: String,
    pub ise_id: u32,
    pub device_type: String,
    pub channels: Vec<ChannelEntry>,
}

/// One `<channel>` of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntry {
    pub name: String,
    /// Channel address, e.g. `"LEQ0123456:3"`.
    pub address: String,
    pub ise_id: u32,
    pub index: u32,
}

/// Client for the hub's XML-API add-on.
#[derive(Debug, Clone)]
pub struct XmlApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl XmlApiClient {
    /// `base_url` is the add-on root, e.g. `http://ccu:80/addons/xmlapi/`.
    pub fn new(
        base_url: Url,
        token: Option<SecretString>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
            token: None,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch and parse the device inventory.
    pub async fn device_list(&self) -> Result<Vec<DeviceListEntry>, Error> {
        let mut url = self.base_url.join("devicelist.cgi")?;
        if let Some(token) = &self.token {
            url.query_pairs_mut().append_pair("sid", token.expose_secret());
        }
        debug!(url = %self.base_url, "GET devicelist.cgi");

        let resp = self.http.get(url).send().await.map_err(Error::Transport)?;
        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;
        trace!(status = status.as_u16(), body = %body, "device list response");

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        parse_device_list(&body)
    }
}

/// Parse a `devicelist.cgi` document.
pub fn parse_device_list(body: &str) -> Result<Vec<DeviceListEntry>, Error> {
    let root = xml::parse(body).map_err(|e| malformed(e.to_string()))?;
    if root.name != "deviceList" {
        // The add-on reports bad tokens as <result><not_authenticated/></result>.
        return Err(malformed(format!("unexpected root <{}>", root.name)));
    }

    root.children_named("device").map(parse_device).collect()
}

fn parse_device(device: &Element) -> Result<DeviceListEntry, Error> {
    let channels = device
        .children_named("channel")
        .map(parse_channel)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DeviceListEntry {
        name: required(device, "name")?.to_owned(),
        address: required(device, "address")?.to_owned(),
        ise_id: numeric(device, "ise_id")?,
        device_type: required(device, "device_type")?.to_owned(),
        channels,
    })
}

fn parse_channel(channel: &Element) -> Result<ChannelEntry, Error> {
    let address = required(channel, "address")?;
    // Older add-on versions omit `index`; it is the address suffix.
    let index = match channel.attr("index") {
        Some(_) => numeric(channel, "index")?,
        None => address
            .rsplit_once(':')
            .and_then(|(_, suffix)| suffix.parse().ok())
            .ok_or_else(|| malformed(format!("channel {address} has no index")))?,
    };

    Ok(ChannelEntry {
        name: required(channel, "name")?.to_owned(),
        address: address.to_owned(),
        ise_id: numeric(channel, "ise_id")?,
        index,
    })
}

fn required<'a>(element: &'a Element, attr: &str) -> Result<&'a str, Error> {
    element
        .attr(attr)
        .ok_or_else(|| malformed(format!("<{}> without {attr}", element.name)))
}

fn numeric(element: &Element, attr: &str) -> Result<u32, Error> {
    let raw = required(element, attr)?;
    raw.trim()
        .parse()
        .map_err(|_| malformed(format!("<{}> has non-numeric {attr} {raw:?}", element.name)))
}

fn malformed(message: String) -> Error {
    Error::DeviceList { message }
}
