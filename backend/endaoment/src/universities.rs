//! Static university directory shared by the client flows, the dashboards,
//! the registration pass and the API.

use serde::Serialize;

use crate::abi::Address;
use crate::errors::{EndaomentError, Result};
use crate::format::USDC_UNIT;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct University {
    pub id: &'static str,
    pub name: &'static str,
    pub short_name: &'static str,
    /// Published treasury wallet (checksummed)
    pub wallet: &'static str,
    pub description: &'static str,
    /// Fundraising goal in whole USDC
    pub capital_goal: u64,
    pub is_active: bool,
}

impl University {
    pub fn wallet_address(&self) -> Result<Address> {
        self.wallet
            .parse()
            .map_err(|_| EndaomentError::Config(format!("bad wallet for {}: {}", self.id, self.wallet)))
    }

    /// Goal in stablecoin base units.
    pub fn capital_goal_units(&self) -> u128 {
        u128::from(self.capital_goal) * USDC_UNIT
    }
}

pub static UNIVERSITIES: &[University] = &[
    University {
        id: "unam",
        name: "Universidad Nacional Autónoma de México",
        short_name: "UNAM",
        wallet: "0x791DC44d843870dEE8832bF9801F0DCbdb1D0618",
        description: "La máxima casa de estudios de México",
        capital_goal: 1_000_000,
        is_active: true,
    },
    University {
        id: "ibero",
        name: "Universidad Iberoamericana",
        short_name: "IBERO",
        wallet: "0x904A9868954044925758D4a483Ae126BE884e934",
        description: "Comprometida con la excelencia académica",
        capital_goal: 500_000,
        is_active: true,
    },
    University {
        id: "buap",
        name: "Benemérita Universidad Autónoma de Puebla",
        short_name: "BUAP",
        wallet: "0x6c40b6c7835401BA249b36e4F0eFb62B8ABfc310",
        description: "Tradición y excelencia desde 1578",
        capital_goal: 750_000,
        is_active: true,
    },
    University {
        id: "udlap",
        name: "Universidad de las Américas Puebla",
        short_name: "UDLAP",
        wallet: "0x0699A33d04D1400a1922Ae80D6e3306E4932063b",
        description: "Innovación y liderazgo educativo",
        capital_goal: 600_000,
        is_active: true,
    },
    University {
        id: "anahuac",
        name: "Universidad Anáhuac",
        short_name: "ANAHUAC",
        wallet: "0x5B2cE48D1d74E6d2040b40246501B9d601fb4b82",
        description: "Formando líderes de acción positiva",
        capital_goal: 800_000,
        is_active: true,
    },
    University {
        id: "tec",
        name: "Tecnológico de Monterrey",
        short_name: "TEC",
        wallet: "0x357B924B9f549B4C6a9DB212a24E615d175E336D",
        description: "Líder en innovación educativa",
        capital_goal: 1_200_000,
        is_active: true,
    },
];

pub fn by_id(id: &str) -> Option<&'static University> {
    UNIVERSITIES.iter().find(|u| u.id == id)
}

/// Case-insensitive wallet lookup.
pub fn by_wallet(wallet: &str) -> Option<&'static University> {
    UNIVERSITIES.iter().find(|u| u.wallet.eq_ignore_ascii_case(wallet.trim()))
}

pub fn active() -> impl Iterator<Item = &'static University> {
    UNIVERSITIES.iter().filter(|u| u.is_active)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups() {
        assert_eq!(by_id("tec").unwrap().short_name, "TEC");
        assert!(by_id("mit").is_none());
        assert_eq!(
            by_wallet("0x791dc44d843870dee8832bf9801f0dcbdb1d0618").unwrap().id,
            "unam"
        );
        assert_eq!(active().count(), 6);
    }

    #[test]
    fn every_wallet_parses() {
        for university in UNIVERSITIES {
            let address = university.wallet_address().unwrap();
            assert!(address.to_string().eq_ignore_ascii_case(university.wallet));
        }
        assert_eq!(by_id("unam").unwrap().capital_goal_units(), 1_000_000 * USDC_UNIT);
    }
}
