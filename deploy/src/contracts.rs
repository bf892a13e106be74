use ethers::{contract::abigen, types::H160};

/// Canonical WETH9 on Ethereum mainnet, also present on any mainnet fork.
pub const MAINNET_WETH: H160 = H160([
    0xc0, 0x2a, 0xaa, 0x39, 0xb2, 0x23, 0xfe, 0x8d, 0x0a, 0x0e, 0x5c, 0x4f, 0x27, 0xea, 0xd9, 0x08,
    0x3c, 0x75, 0x6c, 0xc2,
]);

abigen!(
    IERC20,
    r#"[
        function name() external view returns (string)
        function symbol() external view returns (string)
        function decimals() external view returns (uint8)
        function totalSupply() external view returns (uint256)
        function balanceOf(address account) external view returns (uint256)
        function allowance(address owner, address spender) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
        function transfer(address to, uint256 amount) external returns (bool)
        function transferFrom(address from, address to, uint256 amount) external returns (bool)
    ]"#
);

abigen!(
    IWETH,
    r#"[
        function name() external view returns (string)
        function symbol() external view returns (string)
        function decimals() external view returns (uint8)
        function totalSupply() external view returns (uint256)
        function balanceOf(address account) external view returns (uint256)
        function deposit() external payable
        function withdraw(uint256 wad) external
        function approve(address spender, uint256 amount) external returns (bool)
        function transfer(address to, uint256 amount) external returns (bool)
        function transferFrom(address from, address to, uint256 amount) external returns (bool)
    ]"#
);

#[cfg(test)]
mod tests {
    use ethers::utils::to_checksum;

    use super::*;

    #[test]
    fn test_weth_address() {
        assert_eq!(
            to_checksum(&MAINNET_WETH, None),
            "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
        );
    }

    #[test]
    fn test_interfaces_parse() {
        assert!(IERC20_ABI.function("balanceOf").is_ok());
        assert!(IWETH_ABI.function("deposit").is_ok());
        assert!(IWETH_ABI.constructor().is_none());
    }
}
