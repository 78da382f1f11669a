//  Copyright 2024 Ring Cache Authors
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! Validation for peer addresses of the form `host:port`, where `host` is
//! either `localhost` or a dotted-quad IPv4 address.

/// Returns `true` if `addr` is a well-formed `host:port` pair.
pub fn is_valid_peer_addr(addr: &str) -> bool {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return false;
    };
    if port.parse::<u16>().is_err() {
        return false;
    }
    is_valid_host(host)
}

fn is_valid_host(host: &str) -> bool {
    if host == "localhost" {
        return true;
    }
    let labels: Vec<&str> = host.split('.').collect();
    labels.len() == 4 && labels.iter().all(|l| l.parse::<u8>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_localhost_and_dotted_quad() {
        assert!(is_valid_peer_addr("localhost:7654"));
        assert!(is_valid_peer_addr("10.0.0.2:8009"));
        assert!(is_valid_peer_addr("127.0.0.1:7654"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_peer_addr("localhost"));
        assert!(!is_valid_peer_addr("10.0.0.2:notaport"));
        assert!(!is_valid_peer_addr("10.0.0:8009"));
        assert!(!is_valid_peer_addr("256.0.0.1:8009"));
        assert!(!is_valid_peer_addr("example.com:8009"));
    }
}
