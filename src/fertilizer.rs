pub const NO_SHOPS: &str = "No shops found in this city.";

pub fn shops_for(city: &str) -> Vec<&'static str> {
    match city.trim().to_lowercase().as_str() {
        "chennai" => vec!["GreenGrow Fertilizers", "AgroMart", "Farmer’s Hub"],
        "madurai" => vec!["Madurai Agro Depot", "GrowWell Traders"],
        "vellore" => vec!["Vellore Fertilizer Center", "AgriNeeds"],
        _ => vec![NO_SHOPS],
    }
}
